//! Static HTML report for a staking-rewards evidence bundle.

use num_traits::ToPrimitive;
use stake_accounting::amount::{MultiTokenAmount, TokenInfo, TokenRegistry};
use stake_accounting::delegation::{DelegationStatus, PendingTarget};
use stake_accounting::verify::EvidenceBundle;
use std::fmt::Write as _;
use std::io::Write;
use std::path::Path;

/// Data passed to the HTML report generator: bundle, its hash and display metadata.
#[derive(Clone, Debug)]
pub struct ReportData {
    pub bundle: EvidenceBundle,
    pub reproducibility_hash_sha256: String,
    pub default_token: TokenInfo,
}

const CHART_WIDTH: f64 = 680.0;
const CHART_HEIGHT: f64 = 160.0;

/// Render a static HTML report to `out_path`. Embeds the full bundle JSON for verification.
pub fn render_report(data: &ReportData, out_path: impl AsRef<Path>) -> Result<(), ReportError> {
    let html = build_html(data)?;
    let mut f = std::fs::File::create(out_path.as_ref()).map_err(ReportError::Io)?;
    f.write_all(html.as_bytes()).map_err(ReportError::Io)?;
    Ok(())
}

/// Build HTML string from report data (for testing or in-memory use).
pub fn build_html(data: &ReportData) -> Result<String, ReportError> {
    let bundle = &data.bundle;
    let history = &bundle.history;
    let mut registry = TokenRegistry::new();
    registry.register_default(data.default_token.clone());
    let fmt = |amount: &MultiTokenAmount| -> Result<String, ReportError> {
        registry.format_default(amount).map_err(ReportError::Amount)
    };

    let json_embed = serde_json::to_string(bundle).map_err(ReportError::Json)?;
    let rewarded = history
        .points
        .iter()
        .filter(|p| !p.delta_amount.is_empty())
        .count();

    let mut rows = String::new();
    for p in history.points.iter().rev().filter(|p| !p.delta_amount.is_empty()) {
        let _ = writeln!(
            rows,
            "<tr><td>{}</td><td class=\"num\">{}</td><td class=\"num\">{}</td><td>{}</td></tr>",
            p.epoch,
            escape_html(&fmt(&p.delta_amount)?),
            escape_html(&fmt(&p.cumulative_amount)?),
            escape_html(&p.pool_label),
        );
    }
    if rows.is_empty() {
        rows.push_str("<tr><td colspan=\"4\">No rewards in this window.</td></tr>\n");
    }

    let delegation = bundle
        .delegation
        .as_ref()
        .map(|d| delegation_text(d, bundle))
        .unwrap_or_else(|| "Not recorded".to_string());
    let mangled = match &bundle.mangled {
        Some(m) => format!(
            r#"<div class="grid">
    <span class="label">Reclaimable</span><span class="mono">{}</span>
    <span class="label">Stuck (dust or fee)</span><span class="mono">{}</span>
  </div>"#,
            escape_html(&fmt(&m.can_unmangle)?),
            escape_html(&fmt(&m.cannot_unmangle)?),
        ),
        None => "<p>Not recorded</p>".to_string(),
    };

    let html = format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="UTF-8"/>
<meta name="viewport" content="width=device-width,initial-scale=1"/>
<title>Staking Rewards – {wallet}</title>
<style>
:root {{ font-family: system-ui, sans-serif; background: #0f1419; color: #e6edf3; }}
body {{ max-width: 720px; margin: 0 auto; padding: 1.5rem; }}
h1 {{ font-size: 1.4rem; margin-bottom: 0.5rem; }}
h2 {{ font-size: 1.1rem; margin-top: 1.5rem; color: #8b949e; }}
.mono {{ font-family: ui-monospace, monospace; font-size: 0.9em; word-break: break-all; }}
.card {{ background: #161b22; border: 1px solid #30363d; border-radius: 6px; padding: 1rem; margin: 0.5rem 0; }}
.grid {{ display: grid; grid-template-columns: auto 1fr; gap: 0.25rem 1rem; }}
.label {{ color: #8b949e; }}
.hash {{ font-size: 0.85em; }}
.footer {{ margin-top: 2rem; font-size: 0.85rem; color: #8b949e; }}
table {{ width: 100%; border-collapse: collapse; font-size: 0.9rem; }}
td, th {{ padding: 0.2rem 0.4rem; border-bottom: 1px solid #30363d; text-align: left; }}
.num {{ text-align: right; font-family: ui-monospace, monospace; }}
</style>
</head>
<body>
<h1>Staking Rewards Report</h1>
<p class="mono">{wallet}</p>
<p>Generated: {created}</p>

<h2>Reproducibility</h2>
<div class="card">
  <div class="mono hash">SHA-256: {hash}</div>
  <p class="footer">Anyone can verify this report by re-running <code>stake-accounting verify --bundle &lt;file&gt;</code> and comparing the hash.</p>
</div>

<h2>Summary</h2>
<div class="card">
  <div class="grid">
    <span class="label">Epochs</span><span class="mono">{start} – {last}</span>
    <span class="label">Rewarded epochs</span><span class="mono">{rewarded}</span>
    <span class="label">Total rewards</span><span class="mono">{total}</span>
    <span class="label">Delegation</span><span>{delegation}</span>
  </div>
</div>

<h2>Cumulative rewards</h2>
<div class="card">
{chart}
</div>

<h2>Mangled funds</h2>
<div class="card">
  {mangled}
</div>

<h2>Rewards per epoch</h2>
<div class="card">
<table>
<tr><th>Epoch</th><th class="num">Reward</th><th class="num">Total</th><th>Pool</th></tr>
{rows}</table>
</div>

<h2>Evidence bundle (embedded)</h2>
<div class="card">
  <p class="footer">The full evidence bundle is embedded below for verification. Do not edit.</p>
  <script type="application/json" id="evidence-bundle">{json_embed}</script>
</div>

<div class="footer">
  <p>Generated by stake-accounting. Read-only tool; no seeds; no signing.</p>
</div>
</body>
</html>"#,
        wallet = escape_html(&bundle.wallet_id),
        created = escape_html(&bundle.created_utc_rfc3339),
        hash = escape_html(&data.reproducibility_hash_sha256),
        start = history.start_epoch,
        last = history.end_epoch.saturating_sub(1),
        rewarded = rewarded,
        total = escape_html(&fmt(&history.total())?),
        delegation = escape_html(&delegation),
        chart = cumulative_chart(bundle),
        mangled = mangled,
        rows = rows,
        json_embed = escape_json_in_html(&json_embed),
    );
    Ok(html)
}

fn delegation_text(status: &DelegationStatus, bundle: &EvidenceBundle) -> String {
    let label = |pool: &str| {
        bundle
            .pool_labels
            .get(pool)
            .cloned()
            .unwrap_or_else(|| stake_accounting::delegation::short_hash(pool))
    };
    match status {
        DelegationStatus::Unregistered => "Not registered".to_string(),
        DelegationStatus::Registered => "Registered, not delegated".to_string(),
        DelegationStatus::Delegated { pool } => format!("Delegated to {}", label(pool)),
        DelegationStatus::Deregistered => "Deregistered".to_string(),
        DelegationStatus::PendingConfirmation { previous, target } => {
            let next = match target {
                PendingTarget::Pool(pool) => format!("switch to {}", label(pool)),
                PendingTarget::Deregister => "deregistration".to_string(),
            };
            format!("{} ({next} pending)", delegation_text(previous, bundle))
        }
    }
}

/// Inline SVG polyline of the cumulative default-token amount.
fn cumulative_chart(bundle: &EvidenceBundle) -> String {
    let values: Vec<f64> = bundle
        .history
        .points
        .iter()
        .map(|p| p.cumulative_amount.default_amount().to_f64().unwrap_or(0.0))
        .collect();
    let max = values.iter().copied().fold(0.0_f64, f64::max);
    if values.len() < 2 || max <= 0.0 {
        return "<p>Not enough data to chart.</p>".to_string();
    }
    let step = CHART_WIDTH / (values.len() - 1) as f64;
    let points: Vec<String> = values
        .iter()
        .enumerate()
        .map(|(i, v)| {
            let x = i as f64 * step;
            let y = CHART_HEIGHT - v / max * CHART_HEIGHT;
            format!("{x:.1},{y:.1}")
        })
        .collect();
    format!(
        r##"<svg viewBox="0 0 {CHART_WIDTH} {CHART_HEIGHT}" width="100%" role="img" aria-label="cumulative rewards"><polyline fill="none" stroke="#58a6ff" stroke-width="2" points="{}"/></svg>"##,
        points.join(" ")
    )
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Only `<` can close a script element early.
fn escape_json_in_html(s: &str) -> String {
    s.replace('<', "\\u003c")
}

#[derive(Debug)]
pub enum ReportError {
    Io(std::io::Error),
    Json(serde_json::Error),
    Amount(stake_accounting::amount::AmountError),
}

impl std::fmt::Display for ReportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReportError::Io(e) => write!(f, "io: {}", e),
            ReportError::Json(e) => write!(f, "json: {}", e),
            ReportError::Amount(e) => write!(f, "amount: {}", e),
        }
    }
}

impl std::error::Error for ReportError {}

#[cfg(test)]
mod tests {
    use super::*;
    use stake_accounting::amount::TokenKey;
    use stake_accounting::rewards::RewardLedgerEntry;
    use std::collections::BTreeMap;

    fn ada() -> TokenInfo {
        TokenInfo {
            identifier: String::new(),
            network_id: 1,
            ticker: Some("ADA".into()),
            decimals: 6,
        }
    }

    fn data() -> ReportData {
        let ledger = vec![
            RewardLedgerEntry {
                epoch: 10,
                amount: MultiTokenAmount::from_default(TokenKey::primary(1), 5_000_000),
                pool_hash: "p1".into(),
            },
            RewardLedgerEntry {
                epoch: 12,
                amount: MultiTokenAmount::from_default(TokenKey::primary(1), 3_000_000),
                pool_hash: "p1".into(),
            },
        ];
        let labels = BTreeMap::from([("p1".to_string(), "[<ONE>] Pool One".to_string())]);
        let bundle = EvidenceBundle::build(
            "stake1u9_test".into(),
            &TokenKey::primary(1),
            ledger,
            10,
            13,
            labels,
        )
        .unwrap()
        .with_delegation(DelegationStatus::Delegated { pool: "p1".into() });
        ReportData {
            bundle,
            reproducibility_hash_sha256: "a".repeat(64),
            default_token: ada(),
        }
    }

    #[test]
    fn build_html_contains_history() {
        let html = build_html(&data()).unwrap();
        assert!(html.contains("Staking Rewards Report"));
        assert!(html.contains("stake1u9_test"));
        assert!(html.contains("8.000000 ADA"));
        assert!(html.contains("<polyline"));
        assert!(html.contains("evidence-bundle"));
    }

    #[test]
    fn labels_are_escaped() {
        let html = build_html(&data()).unwrap();
        assert!(html.contains("[&lt;ONE&gt;] Pool One"));
        assert!(!html.contains("[<ONE>]"));
        assert!(html.contains("Delegated to [&lt;ONE&gt;] Pool One"));
    }

    #[test]
    fn missing_default_token_is_an_error() {
        let mut d = data();
        d.default_token.network_id = 0;
        assert!(matches!(build_html(&d), Err(ReportError::Amount(_))));
    }
}
