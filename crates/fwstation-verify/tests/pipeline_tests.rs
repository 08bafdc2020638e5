//! End-to-end tests of the verification pipeline against fixture volumes

use fwstation_config::{SignatureScheme, StationConfig};
use fwstation_test_helpers::prelude::*;
use fwstation_verify::prelude::*;
use std::path::PathBuf;
use std::time::Duration;
use tracing_test::traced_test;

fn config_for(volume: &VolumeFixture, certificate: bool, checksum: bool) -> StationConfig {
    let mut config = StationConfig::default();
    config.security.require_certificate = certificate;
    config.security.verify_checksum = checksum;
    config.security.public_key_path = volume.public_key_path().to_path_buf();
    config.security.scheme = SignatureScheme::Ed25519;
    config
}

fn pipeline_for(volume: &VolumeFixture, certificate: bool, checksum: bool) -> VerificationPipeline {
    VerificationPipeline::new(VerificationPolicy::from_config(&config_for(
        volume,
        certificate,
        checksum,
    )))
}

#[tokio::test]
async fn fully_valid_volume_passes() -> TestResult {
    let volume = VolumeFixture::builder().build()?;
    let verdict = pipeline_for(&volume, true, true).verify(volume.root()).await;

    assert!(verdict.ok, "{}", verdict.reason);
    assert_eq!(verdict.failed_step, None);
    assert_eq!(verdict.firmware_path, Some(volume.image_path()));
    assert_eq!(verdict.mount_point.as_deref(), Some(volume.root()));
    let manifest = must_some(verdict.manifest, "manifest on success");
    assert_eq!(manifest.firmware_version, "1.4.2");
    Ok(())
}

#[tokio::test]
async fn checks_disabled_only_need_manifest_and_image() -> TestResult {
    for (signature, checksum) in [(true, true), (true, false), (false, true), (false, false)] {
        let mut builder = VolumeFixture::builder();
        if !signature {
            builder = builder.unsigned();
        }
        if !checksum {
            builder = builder.without_checksum();
        }
        let volume = builder.build()?;
        let verdict = pipeline_for(&volume, false, false).verify(volume.root()).await;
        assert!(verdict.ok, "signature={signature} checksum={checksum}: {}", verdict.reason);
    }

    let no_image = VolumeFixture::builder().image(None).build()?;
    let verdict = pipeline_for(&no_image, false, false).verify(no_image.root()).await;
    assert!(!verdict.ok);
    assert_eq!(verdict.reason, "missing required files: firmware.bin");
    Ok(())
}

#[tokio::test]
async fn every_missing_file_is_listed() -> TestResult {
    let volume = VolumeFixture::builder()
        .manifest(None)
        .unsigned()
        .without_checksum()
        .build()?;
    let verdict = pipeline_for(&volume, true, true).verify(volume.root()).await;

    assert_eq!(verdict.failed_step, Some(VerificationStep::FileStructure));
    assert_eq!(
        verdict.reason,
        "missing required files: device_info.json, device_info.sig, firmware.sha256"
    );
    assert_eq!(verdict.firmware_path, None);
    Ok(())
}

#[tokio::test]
async fn unparsable_manifest_gives_generic_reason() -> TestResult {
    let volume = VolumeFixture::builder()
        .manifest(Some(r#"{"device_id": "only-one-field"}"#))
        .build()?;
    let verdict = pipeline_for(&volume, false, true).verify(volume.root()).await;

    assert_eq!(verdict.failed_step, Some(VerificationStep::Manifest));
    assert_eq!(verdict.reason, REASON_MANIFEST_LOAD);
    Ok(())
}

#[tokio::test]
async fn wrong_checksum_is_rejected() -> TestResult {
    let volume = VolumeFixture::builder()
        .checksum_contents(&"0".repeat(64))
        .build()?;
    let verdict = pipeline_for(&volume, false, true).verify(volume.root()).await;

    assert_eq!(verdict.failed_step, Some(VerificationStep::Checksum));
    assert_eq!(verdict.reason, REASON_CHECKSUM_MISMATCH);
    Ok(())
}

#[tokio::test]
async fn signature_failure_stops_before_checksum() -> TestResult {
    let volume = VolumeFixture::builder()
        .checksum_contents("not-a-digest")
        .build()?;
    std::fs::write(volume.manifest_path(), sample_manifest("Tampered Target"))?;
    let verdict = pipeline_for(&volume, true, true).verify(volume.root()).await;

    assert_eq!(verdict.failed_step, Some(VerificationStep::Signature));
    assert_eq!(verdict.reason, REASON_INVALID_SIGNATURE);
    Ok(())
}

#[tokio::test]
async fn tampered_signature_is_rejected() -> TestResult {
    let volume = VolumeFixture::builder().build()?;
    let signature = std::fs::read_to_string(volume.signature_path())?;
    let mut bytes = hex::decode(signature.trim())?;
    assert_eq!(bytes.len(), 64);
    if let Some(first) = bytes.first_mut() {
        *first ^= 0x01;
    }
    std::fs::write(volume.signature_path(), hex::encode(&bytes))?;

    let verdict = pipeline_for(&volume, true, false).verify(volume.root()).await;
    assert_eq!(verdict.reason, REASON_INVALID_SIGNATURE);
    Ok(())
}

#[tokio::test]
async fn missing_public_key_disables_signature_step() -> TestResult {
    let volume = VolumeFixture::builder().unsigned().build()?;
    let mut config = config_for(&volume, true, true);
    config.security.public_key_path = PathBuf::from("/nonexistent/fwstation/public.key");

    let policy = VerificationPolicy::from_config(&config);
    assert!(!policy.require_certificate);

    let verdict = VerificationPipeline::new(policy).verify(volume.root()).await;
    assert!(verdict.ok, "{}", verdict.reason);
    Ok(())
}

#[tokio::test]
#[traced_test]
async fn target_name_mismatch_only_warns() -> TestResult {
    let volume = VolumeFixture::builder()
        .manifest(Some(&sample_manifest("Some Other Board")))
        .unsigned()
        .build()?;
    let verdict = pipeline_for(&volume, false, true).verify(volume.root()).await;

    assert!(verdict.ok, "{}", verdict.reason);
    assert!(logs_contain("Manifest target does not match"));
    Ok(())
}

#[tokio::test]
async fn volume_is_not_modified() -> TestResult {
    let volume = VolumeFixture::builder().build()?;
    let before = snapshot(volume.root())?;
    let _ = pipeline_for(&volume, true, true).verify(volume.root()).await;
    assert_eq!(snapshot(volume.root())?, before);
    Ok(())
}

fn snapshot(root: &std::path::Path) -> std::io::Result<Vec<(String, Vec<u8>)>> {
    let mut entries = Vec::new();
    for entry in std::fs::read_dir(root)? {
        let entry = entry?;
        entries.push((
            entry.file_name().to_string_lossy().into_owned(),
            std::fs::read(entry.path())?,
        ));
    }
    entries.sort();
    Ok(entries)
}

#[cfg(unix)]
mod openssl_backend {
    use super::*;

    fn openssl_pipeline(volume: &VolumeFixture, tool: &ToolStub, timeout: u64) -> VerificationPipeline {
        let mut config = config_for(volume, true, false);
        config.security.scheme = SignatureScheme::Openssl;
        config.security.verifier_tool = tool.program();
        config.security.verify_timeout = timeout;
        VerificationPipeline::new(VerificationPolicy::from_config(&config))
    }

    #[tokio::test]
    async fn passes_expected_arguments() -> TestResult {
        let volume = VolumeFixture::builder().build()?;
        let tool = ToolStub::exit_with(0)?;
        let verdict = openssl_pipeline(&volume, &tool, 10).verify(volume.root()).await;
        assert!(verdict.ok, "{}", verdict.reason);

        let calls = tool.invocations()?;
        let args = must_some(calls.first(), "one invocation");
        let expected = vec![
            "dgst".to_string(),
            "-sha256".to_string(),
            "-verify".to_string(),
            volume.public_key_path().display().to_string(),
            "-signature".to_string(),
            volume.signature_path().display().to_string(),
            volume.manifest_path().display().to_string(),
        ];
        assert_eq!(args, &expected);
        Ok(())
    }

    #[tokio::test]
    async fn non_zero_exit_is_invalid_signature() -> TestResult {
        let volume = VolumeFixture::builder().build()?;
        let tool = ToolStub::exit_with(1)?;
        let verdict = openssl_pipeline(&volume, &tool, 10).verify(volume.root()).await;
        assert_eq!(verdict.reason, REASON_INVALID_SIGNATURE);
        Ok(())
    }

    #[tokio::test]
    async fn missing_tool_is_invalid_signature() -> TestResult {
        let volume = VolumeFixture::builder().build()?;
        let mut config = config_for(&volume, true, false);
        config.security.scheme = SignatureScheme::Openssl;
        config.security.verifier_tool = "/nonexistent/fwstation/openssl".to_string();
        let pipeline = VerificationPipeline::new(VerificationPolicy::from_config(&config));

        let verdict = pipeline.verify(volume.root()).await;
        assert_eq!(verdict.reason, REASON_INVALID_SIGNATURE);
        Ok(())
    }

    #[tokio::test]
    async fn slow_tool_times_out() -> TestResult {
        let volume = VolumeFixture::builder().build()?;
        let tool = ToolStub::sleeping(5)?;
        let started = std::time::Instant::now();
        let verdict = openssl_pipeline(&volume, &tool, 1).verify(volume.root()).await;

        assert_eq!(verdict.failed_step, Some(VerificationStep::Signature));
        assert_eq!(verdict.reason, "signature verification timed out after 1s");
        assert!(started.elapsed() < Duration::from_secs(4));
        Ok(())
    }
}
