use std::fs;

use test_log_combiner::{combine, find_log_files, CombineError, SortOrder};

#[test]
fn test_combines_nested_logs_grouped_by_job() {
    let input = tempfile::tempdir().unwrap();
    let nested = input.path().join("TestAccountLogs_plan/test_logs");
    fs::create_dir_all(&nested).unwrap();
    fs::write(nested.join("test_account_log_b.txt"), "[2025-01-01 00:00:02] b1\n").unwrap();
    fs::write(input.path().join("test_account_log_a.txt"), "a1\na2\n").unwrap();
    fs::write(input.path().join("unrelated.txt"), "ignored\n").unwrap();

    let out = tempfile::tempdir().unwrap();
    let output = out.path().join("combined.txt");
    let report = combine(input.path(), &output, SortOrder::ByJob).unwrap();

    assert_eq!(report.files.len(), 2);
    assert_eq!(report.entries, 3);
    assert!(report.succeeded());

    let text = fs::read_to_string(&output).unwrap();
    assert!(text.contains("Total Jobs: 2\n"));
    assert!(text.contains("Total Entries: 3\n"));
    assert!(!text.contains("ignored"));
    let a = text.find("Job: a\n").unwrap();
    let b = text.find("Job: b\n").unwrap();
    // path order: "TestAccountLogs_plan/" sorts before "test_account_log_a.txt"
    assert!(b < a);
}

#[test]
fn test_sort_by_time_interleaves_jobs() {
    let input = tempfile::tempdir().unwrap();
    fs::write(
        input.path().join("test_account_log_a.txt"),
        "[2025-01-01 00:00:03] a late\n[2025-01-01 00:00:01] a early\n",
    )
    .unwrap();
    fs::write(input.path().join("test_account_log_b.txt"), "[2025-01-01 00:00:02] b mid\nno stamp\n").unwrap();

    let out = tempfile::tempdir().unwrap();
    let output = out.path().join("combined.txt");
    combine(input.path(), &output, SortOrder::ByTime).unwrap();

    let text = fs::read_to_string(&output).unwrap();
    let body = text.split("\n\n").nth(1).unwrap();
    assert_eq!(
        body,
        "[2025-01-01 00:00:01] a early\n[2025-01-01 00:00:02] b mid\n[2025-01-01 00:00:03] a late\nno stamp\n"
    );
}

#[test]
fn test_empty_files_are_skipped() {
    let input = tempfile::tempdir().unwrap();
    fs::write(input.path().join("test_account_log_empty.txt"), "").unwrap();
    fs::write(input.path().join("test_account_log_full.txt"), "line\n").unwrap();

    let out = tempfile::tempdir().unwrap();
    let report = combine(input.path(), &out.path().join("c.txt"), SortOrder::ByJob).unwrap();
    assert_eq!(report.files.len(), 2);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.entries, 1);
}

#[test]
fn test_no_entries_writes_nothing() {
    let input = tempfile::tempdir().unwrap();
    fs::write(input.path().join("test_account_log_empty.txt"), "").unwrap();

    let out = tempfile::tempdir().unwrap();
    let output = out.path().join("c.txt");
    let report = combine(input.path(), &output, SortOrder::ByJob).unwrap();
    assert!(!report.succeeded());
    assert!(report.output.is_none());
    assert!(!output.exists());
}

#[test]
fn test_no_log_files() {
    let input = tempfile::tempdir().unwrap();
    assert!(find_log_files(input.path()).unwrap().is_empty());
    let report = combine(input.path(), &input.path().join("c.txt"), SortOrder::ByJob).unwrap();
    assert!(report.files.is_empty());
    assert!(!report.succeeded());
}

#[test]
fn test_missing_input_dir() {
    let input = tempfile::tempdir().unwrap();
    let missing = input.path().join("nope");
    let err = combine(&missing, &input.path().join("c.txt"), SortOrder::ByJob).unwrap_err();
    assert!(matches!(err, CombineError::MissingInput(_)));
}

#[test]
fn test_files_sorted_by_whole_path_string() {
    let input = tempfile::tempdir().unwrap();
    for (dir, job) in [("a", "first"), ("a-b", "second")] {
        fs::create_dir_all(input.path().join(dir)).unwrap();
        fs::write(input.path().join(dir).join(format!("test_account_log_{}.txt", job)), "x\n").unwrap();
    }

    let files = find_log_files(input.path()).unwrap();
    let jobs: Vec<String> = files.iter().map(|f| test_log_combiner::job_name(f)).collect();
    assert_eq!(jobs, vec!["second", "first"]);
}
