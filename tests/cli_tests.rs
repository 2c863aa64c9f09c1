use assert_cmd::Command;
use std::fs;

fn rollsync() -> Command {
    Command::cargo_bin("rollsync").unwrap()
}

#[test]
fn signature_delta_patch_over_files() {
    let dir = tempfile::tempdir().unwrap();
    let basis_path = dir.path().join("basis.bin");
    let new_path = dir.path().join("new.bin");

    let basis: Vec<u8> = (0..4096u32).map(|i| (i.wrapping_mul(131) >> 4) as u8).collect();
    let mut new = basis.clone();
    new.splice(1000..1100, [0u8; 40]);
    fs::write(&basis_path, &basis).unwrap();
    fs::write(&new_path, &new).unwrap();

    rollsync()
        .args(["signature", "-b", "64"])
        .arg(&basis_path)
        .assert()
        .success();
    let sig_path = dir.path().join("basis.bin.sign");
    assert!(sig_path.exists());

    rollsync()
        .arg("delta")
        .arg(&sig_path)
        .arg(&new_path)
        .assert()
        .success();
    let delta_path = dir.path().join("new.bin-delta");
    let delta = fs::read(&delta_path).unwrap();
    assert!(delta.len() < new.len() / 4, "delta size {}", delta.len());

    rollsync()
        .arg("patch")
        .arg(&basis_path)
        .arg(&delta_path)
        .assert()
        .success();
    let rebuilt = fs::read(dir.path().join("basis-patch.bin")).unwrap();
    assert_eq!(rebuilt, new);
}

#[test]
fn explicit_output_paths_and_verbose() {
    let dir = tempfile::tempdir().unwrap();
    let basis_path = dir.path().join("a");
    fs::write(&basis_path, b"just a tiny basis").unwrap();

    let sig_path = dir.path().join("a.sig");
    rollsync()
        .args(["-v", "signature", "-b", "4", "-s", "64"])
        .arg(&basis_path)
        .arg(&sig_path)
        .assert()
        .success();
    assert!(sig_path.exists());
}

#[test]
fn missing_input_fails() {
    let dir = tempfile::tempdir().unwrap();
    rollsync()
        .arg("signature")
        .arg(dir.path().join("does-not-exist"))
        .assert()
        .failure();
}

#[test]
fn patching_with_a_signature_file_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let basis_path = dir.path().join("basis");
    fs::write(&basis_path, b"0123456789abcdef").unwrap();

    let sig_path = dir.path().join("basis.sign");
    rollsync()
        .arg("signature")
        .arg(&basis_path)
        .assert()
        .success();

    rollsync()
        .arg("patch")
        .arg(&basis_path)
        .arg(&sig_path)
        .assert()
        .failure();
}
