//! Config load error messages and validation of hand-written YAML.

use assert_fs::prelude::*;
use ccdeploy_core::{config, retry::Backoff, ConfigError, UpgradeMode};
use predicates::prelude::predicate;
use rstest::rstest;

const MINIMAL: &str = r#"
network_config: config.yaml
org:
  name: org1
  msp_id: Org1MSP
  admin: Admin
  user: User1
  orderer: orderer.example.com
channel:
  id: mychannel
  artifact: artifacts/channel/mychannel.tx
chaincode:
  name: example_cc
  version: "0.1"
  path: github.com/example/chaincode
  build_root: gopath
"#;

// ---------------------------------------------------------------------------
// 1. Load error messages
// ---------------------------------------------------------------------------

#[test]
fn load_missing_config_returns_not_found() {
    let dir = assert_fs::TempDir::new().expect("tempdir");
    let path = dir.child("ccdeploy.yaml");
    let err = config::load(path.path()).unwrap_err();
    assert!(matches!(err, ConfigError::NotFound { .. }), "got: {err}");
    assert!(err.to_string().contains("ccdeploy.yaml"));
}

#[test]
fn load_corrupt_yaml_returns_parse_error_with_path() {
    let dir = assert_fs::TempDir::new().expect("tempdir");
    let file = dir.child("ccdeploy.yaml");
    file.write_str(": : corrupt : yaml : !!!\n  - broken: [unclosed")
        .expect("write");

    let err = config::load(file.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }), "got: {err}");
    assert!(err.to_string().contains("ccdeploy.yaml"));
}

#[test]
fn load_missing_section_returns_parse_error() {
    let dir = assert_fs::TempDir::new().expect("tempdir");
    let file = dir.child("ccdeploy.yaml");
    file.write_str("network_config: config.yaml\n").expect("write");

    let err = config::load(file.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }), "got: {err}");
}

// ---------------------------------------------------------------------------
// 2. Defaults
// ---------------------------------------------------------------------------

#[test]
fn minimal_config_gets_defaults() {
    let dir = assert_fs::TempDir::new().expect("tempdir");
    let file = dir.child("ccdeploy.yaml");
    file.write_str(MINIMAL).expect("write");

    let cfg = config::load(file.path()).expect("load");
    assert_eq!(cfg.min_peers, 2);
    assert_eq!(cfg.upgrade_mode, UpgradeMode::UnlessInstantiated);
    assert_eq!(cfg.chaincode.init_args, vec!["init".to_string()]);
    assert_eq!(cfg.retry.discovery.max_attempts, 10);
    assert_eq!(cfg.retry.network.backoff, Backoff::Linear { step_ms: 500 });
    assert_eq!(cfg.chaincode.build_root, dir.path().join("gopath"));
}

#[test]
fn scaffold_written_by_save_is_yaml_with_channel_id() {
    let dir = assert_fs::TempDir::new().expect("tempdir");
    let file = dir.child("nested/ccdeploy.yaml");
    config::save(file.path(), &config::scaffold()).expect("save");

    file.assert(predicate::path::exists());
    file.assert(predicate::str::contains("id: mychannel"));
    file.assert(predicate::str::contains("orderer: orderer.example.com"));
}

// ---------------------------------------------------------------------------
// 3. Validation
// ---------------------------------------------------------------------------

#[rstest]
#[case("id: mychannel", "id: \"\"", "channel.id")]
#[case("name: example_cc", "name: \"  \"", "chaincode.name")]
#[case("version: \"0.1\"", "version: \"\"", "chaincode.version")]
#[case("orderer: orderer.example.com", "orderer: \"\"", "org.orderer")]
fn blank_required_field_is_invalid(
    #[case] from: &str,
    #[case] to: &str,
    #[case] field: &str,
) {
    let dir = assert_fs::TempDir::new().expect("tempdir");
    let file = dir.child("ccdeploy.yaml");
    file.write_str(&MINIMAL.replace(from, to)).expect("write");

    let err = config::load(file.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Invalid { .. }), "got: {err}");
    assert!(err.to_string().contains(field), "got: {err}");
}

#[test]
fn artifact_check_passes_once_file_exists() {
    let dir = assert_fs::TempDir::new().expect("tempdir");
    let file = dir.child("ccdeploy.yaml");
    file.write_str(MINIMAL).expect("write");
    let cfg = config::load(file.path()).expect("load");

    assert!(matches!(
        cfg.channel.ensure_artifact(),
        Err(ConfigError::ArtifactMissing { .. })
    ));

    dir.child("artifacts/channel/mychannel.tx")
        .write_binary(b"\x0a\x0b")
        .expect("write artifact");
    assert!(cfg.channel.ensure_artifact().is_ok());
}
