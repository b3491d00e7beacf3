use chainz::utils::fs::walk_files;
use chainz::utils::io::{
    counter, read_csv, read_csv_records, read_jsonl_records, read_lines, write_csv, write_csv_records, write_jsonl,
    write_lines,
};
use chainz::{Chain, ChainError, Record};
use serde_json::json;
use std::cell::Cell;
use std::fs;
use tempfile::TempDir;

#[test]
fn test_lines_round_trip_through_a_chain() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let input = dir.path().join("words.txt");
    let output = dir.path().join("upper.txt");
    fs::write(&input, "alpha\nbeta\n\ngamma\n")?;

    let written = Chain::try_new(read_lines(&input)?)
        .omit(|line| line.is_empty())
        .map(|line| line.to_uppercase())
        .write_to(write_lines(&output, false)?)
        .count()?;

    assert_eq!(written, 3);
    assert_eq!(fs::read_to_string(&output)?, "ALPHA\nBETA\nGAMMA\n");
    Ok(())
}

#[test]
fn test_jsonl_to_csv_with_skipped_lines() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let input = dir.path().join("people.jsonl");
    let output = dir.path().join("people.csv");
    fs::write(
        &input,
        "{\"id\": 1, \"name\": \"ann\"}\n\"not an object\"\n{\"id\": 2}\n{broken\n",
    )?;

    let skipped = Cell::new(0);
    let written = Chain::try_new(read_jsonl_records(&input)?)
        .on_error(|_, _| {
            skipped.set(skipped.get() + 1);
            Ok(())
        })
        .write_to(write_csv_records(&output, vec!["id".into(), "name".into()], true, false)?)
        .count()?;

    assert_eq!((written, skipped.get()), (2, 2));
    assert_eq!(fs::read_to_string(&output)?, "id,name\n1,ann\n2,\n");
    Ok(())
}

#[test]
fn test_csv_records_to_jsonl() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let input = dir.path().join("scores.csv");
    let output = dir.path().join("scores.jsonl");
    fs::write(&input, "player,score\nann,7\nbob,12\n")?;

    Chain::try_new(read_csv_records(&input, None)?)
        .map_key("score", |v| json!(v.as_str().and_then(|s| s.parse::<i64>().ok())))
        .write_to(write_jsonl(&output, false)?)
        .sink()?;

    let back: Vec<serde_json::Value> = Chain::try_new(read_jsonl_records(&output)?)
        .map(Record::into_value)
        .to_vec()?;
    assert_eq!(
        back,
        vec![json!({"player": "ann", "score": 7}), json!({"player": "bob", "score": 12})]
    );
    Ok(())
}

#[test]
fn test_raw_csv_rows_and_append() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("rows.csv");

    Chain::new(vec![vec!["a".to_string(), "1".to_string()]])
        .write_to(write_csv(&path, Some(vec!["name".into(), "value".into()]), false)?)
        .sink()?;
    Chain::new(vec![vec!["b".to_string(), "2".to_string()]])
        .write_to(write_csv(&path, None, true)?)
        .sink()?;

    let rows = Chain::try_new(read_csv(&path)?).to_vec()?;
    assert_eq!(rows, vec![vec!["name", "value"], vec!["a", "1"], vec!["b", "2"]]);
    Ok(())
}

#[test]
fn test_header_with_append_is_rejected_before_running() {
    let dir = TempDir::new().unwrap();
    let result = write_csv_records(dir.path().join("x.csv"), vec!["id".into()], true, true);
    assert!(matches!(result, Err(ChainError::Config { .. })));
    assert!(!dir.path().join("x.csv").exists());
}

#[test]
fn test_counter_and_walk_files() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    fs::create_dir_all(dir.path().join("logs/2024"))?;
    fs::write(dir.path().join("logs/2024/a.log"), "")?;
    fs::write(dir.path().join("logs/b.log"), "")?;
    fs::write(dir.path().join("readme.md"), "")?;

    let seen = Cell::new(0);
    let logs = Chain::try_new(walk_files(dir.path()))
        .transform(counter(|n| seen.set(n)))
        .filter(|path| path.extension().is_some_and(|ext| ext == "log"))
        .map(|path| path.file_name().map(|name| name.to_string_lossy().into_owned()))
        .to_vec()?;

    assert_eq!(logs, vec![Some("a.log".to_string()), Some("b.log".to_string())]);
    assert_eq!(seen.get(), 3);
    Ok(())
}
