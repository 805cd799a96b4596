use std::fs;
use std::path::Path;
use std::process::Command;

use tempfile::tempdir;

fn write_config(dir: &Path) {
    fs::write(dir.join("map.tsv"), "ALLELE\tSNP\tA1\nDQ8\trs7\tG\nDQ2.5\trs1\tA\n").unwrap();
    fs::write(dir.join("rank.tsv"), "DQ\tRANK\nDQ2.5\t1\nDQ8\t2\n").unwrap();
    fs::write(dir.join("interaction.tsv"), "ALLELE1\tALLELE2\tBETA\nDQ8\tDQ2.5\t3.0\n").unwrap();
    fs::write(dir.join("all.tsv"), "ID\tALLELE\tBETA\nrs4\tC\t0.5\nrs1\tA\t0.5\n").unwrap();
    fs::write(
        dir.join("t1dgrs.toml"),
        "[input]\ndq_rank = \"rank.tsv\"\nhla_map = \"map.tsv\"\n\n[scores]\ninteraction = \"interaction.tsv\"\nall_variants = \"all.tsv\"\n",
    )
    .unwrap();
}

#[test]
fn list_prints_sorted_distinct_variants() {
    let tmp = tempdir().expect("temporary directory");
    write_config(tmp.path());

    let exe = env!("CARGO_BIN_EXE_t1dgrs");
    let output = Command::new(exe)
        .current_dir(tmp.path())
        .args(["--config", "t1dgrs.toml", "--list"])
        .output()
        .expect("run t1dgrs cli");

    assert!(output.status.success(), "CLI exited with {:?}", output.status);
    assert_eq!(String::from_utf8_lossy(&output.stdout), "rs1\nrs4\nrs7\n");
}

#[test]
fn invalid_bed_exits_with_input_format_code() {
    let tmp = tempdir().expect("temporary directory");
    write_config(tmp.path());
    fs::write(tmp.path().join("cohort.bed"), b"not a bed").unwrap();
    fs::write(tmp.path().join("cohort.bim"), "").unwrap();
    fs::write(tmp.path().join("cohort.fam"), "").unwrap();

    let exe = env!("CARGO_BIN_EXE_t1dgrs");
    let output = Command::new(exe)
        .current_dir(tmp.path())
        .args(["-b", "cohort", "-c", "t1dgrs.toml", "-o", "out/run"])
        .output()
        .expect("run t1dgrs cli");

    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&output.stderr).contains("InputFormatError"));
    assert!(!tmp.path().join("out").exists());
}

#[test]
fn missing_config_exits_with_config_code() {
    let tmp = tempdir().expect("temporary directory");
    fs::write(tmp.path().join("cohort.bed"), [0x6c, 0x1b, 0x01]).unwrap();
    fs::write(tmp.path().join("cohort.bim"), "6\trs1\t0\t100\tA\tG\n").unwrap();
    fs::write(tmp.path().join("cohort.fam"), "F I1 0 0 1 -9\n").unwrap();

    let exe = env!("CARGO_BIN_EXE_t1dgrs");
    let output = Command::new(exe)
        .current_dir(tmp.path())
        .args(["-b", "cohort", "-c", "absent.toml"])
        .output()
        .expect("run t1dgrs cli");

    assert_eq!(output.status.code(), Some(6));
    assert!(String::from_utf8_lossy(&output.stderr).contains("ConfigError"));
}

#[test]
fn scoring_without_bfile_is_a_usage_error() {
    let tmp = tempdir().expect("temporary directory");
    write_config(tmp.path());

    let exe = env!("CARGO_BIN_EXE_t1dgrs");
    let output = Command::new(exe)
        .current_dir(tmp.path())
        .args(["-c", "t1dgrs.toml"])
        .output()
        .expect("run t1dgrs cli");

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("--bfile"));
    assert!(!tmp.path().join("output_RESULTS.tsv").exists());
}
