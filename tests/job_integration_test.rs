use chainz::utils::io::read_jsonl_records;
use chainz::utils::validation::Validate;
use chainz::{Chain, ChainError, JobConfig, JobEngine, Record};
use serde_json::json;
use std::fs;
use std::io::Write;
use tempfile::{NamedTempFile, TempDir};

fn write_job(dir: &TempDir, body: &str) -> anyhow::Result<NamedTempFile> {
    let root = dir.path().display().to_string().replace('\\', "/");
    let mut file = NamedTempFile::new()?;
    file.write_all(body.replace("{dir}", &root).as_bytes())?;
    Ok(file)
}

#[test]
fn test_job_file_end_to_end() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    fs::write(
        dir.path().join("orders.csv"),
        "order_id,customer,total,status\n\
         100,1,9.50,paid\n\
         101,2,3.00,void\n\
         102,3,12.25,paid\n\
         103,4,1.00,paid\n",
    )?;
    fs::write(
        dir.path().join("customers.jsonl"),
        "{\"customer\": \"1\", \"name\": \"ann\"}\n\
         {\"customer\": \"3\", \"name\": \"cy\"}\n\
         {\"customer\": \"4\", \"name\": \"dee\"}\n",
    )?;
    std::env::set_var("CHAINZ_JOB_TEST_STATUS", "void");

    let job = write_job(
        &dir,
        r#"
[job]
name = "paid orders"
description = "Orders joined with their customer"

[source]
path = "{dir}/orders.csv"
format = "csv"

[[steps]]
op = "omit_eq"
key = "status"
value = "${CHAINZ_JOB_TEST_STATUS}"

[[steps]]
op = "drop_key"
key = "status"

[[steps]]
op = "rename_key"
from = "total"
to = "amount"
strict = true

[[steps]]
op = "join"
key = "customer"
path = "{dir}/customers.jsonl"

[sink]
path = "{dir}/paid.jsonl"
"#,
    )?;

    let config = JobConfig::from_file(job.path())?;
    config.validate()?;
    let report = JobEngine::new(config).run()?;
    assert_eq!(report.written, 3);
    assert_eq!(report.skipped, 0);

    let mut out: Vec<serde_json::Value> = Chain::try_new(read_jsonl_records(dir.path().join("paid.jsonl"))?)
        .map(Record::into_value)
        .to_vec()?;
    out.sort_by_key(|record| record["order_id"].as_str().map(String::from));
    assert_eq!(
        out,
        vec![
            json!({"order_id": "100", "customer": "1", "amount": "9.50", "name": "ann"}),
            json!({"order_id": "102", "customer": "3", "amount": "12.25", "name": "cy"}),
            json!({"order_id": "103", "customer": "4", "amount": "1.00", "name": "dee"}),
        ]
    );
    Ok(())
}

#[test]
fn test_strict_rename_failure_is_not_skipped() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    fs::write(dir.path().join("in.jsonl"), "{\"a\": 1}\n{\"b\": 2}\n")?;
    let job = write_job(
        &dir,
        r#"
[job]
name = "strict"

[source]
path = "{dir}/in.jsonl"

[[steps]]
op = "rename_key"
from = "a"
to = "z"
strict = true

[sink]
path = "{dir}/out.jsonl"

[error_handling]
on_error = "skip"
"#,
    )?;

    let err = JobEngine::new(JobConfig::from_file(job.path())?).run().unwrap_err();
    assert!(matches!(err, ChainError::MissingKey { ref key } if key == "a"));
    Ok(())
}

#[test]
fn test_invalid_job_is_rejected_by_validation() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let job = write_job(
        &dir,
        r#"
[job]
name = "no columns"

[source]
path = "{dir}/in.jsonl"

[[steps]]
op = "keep_keys"
keys = []

[sink]
path = "{dir}/out.csv"
format = "csv"
fieldnames = ["id"]
"#,
    )?;

    let config = JobConfig::from_file(job.path())?;
    assert!(matches!(config.validate(), Err(ChainError::MissingConfig { .. })));
    Ok(())
}
