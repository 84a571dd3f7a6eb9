//! Verify command

use std::path::Path;

use adb_format::{Db, SignatureReport, TrustPolicy};
use anyhow::{Context, Result, bail};

use crate::config::Settings;

/// Check every signature of a container and apply the trust policy.
pub fn verify(path: &Path, settings: &Settings) -> Result<()> {
    let trust = &settings.trust;
    if trust.trusted().is_empty() {
        bail!("no trusted keys (set --keys-dir or keys_dir in the config)");
    }

    println!("  verifying {}", path.display());
    let db = Db::open(path, None, None)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    let reports = db.signature_reports(trust);
    for report in &reports {
        println!("    {}", describe(report));
    }

    trust.policy().evaluate(&reports).with_context(|| {
        format!("{} is not trusted ({})", path.display(), policy_name(trust.policy()))
    })?;
    println!("    ok");
    Ok(())
}

fn describe(report: &SignatureReport) -> String {
    let key = report
        .key_id
        .map_or_else(|| "?".to_string(), |id| id.to_string());
    match &report.outcome {
        Ok(()) => format!("{key}  verified"),
        Err(e) => format!("{key}  {e}"),
    }
}

fn policy_name(policy: &TrustPolicy) -> &'static str {
    match policy {
        TrustPolicy::Any => "policy any",
        TrustPolicy::All => "policy all",
        TrustPolicy::Require(_) => "policy require",
    }
}
