//! Address risk scoring and transfer-level attack detection.
//!
//! Pure, stateless functions: scores combine bounded term contributions
//! into a [0, 100] result, and the detectors operate directly on tabular
//! transfer rows without touching the graph. All functions are total over
//! their input domains — out-of-range numeric inputs are clamped, never
//! rejected.

use crate::config::RiskScoringConfig;
use crate::schemas::{PoisoningMatch, TokenTransferRecord};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Window length for the prefix/suffix comparison in [`address_similarity`].
const SIMILARITY_WINDOW: usize = 8;
const SIMILARITY_PREFIX_WEIGHT: f64 = 0.6;
const SIMILARITY_SUFFIX_WEIGHT: f64 = 0.4;

/// Visual similarity of two addresses in [0, 1].
///
/// Identical addresses score 1.0. Otherwise the score is a weighted sum of
/// the prefix and suffix match ratios over windows of `min(8, len)`
/// characters — the regions wallets display, which address-poisoning
/// attacks imitate. Symmetric by construction.
pub fn address_similarity(a: &str, b: &str) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    if a == b {
        return 1.0;
    }

    let window = SIMILARITY_WINDOW.min(a.len()).min(b.len());
    if window == 0 {
        return 0.0;
    }

    let prefix_matches = a
        .bytes()
        .zip(b.bytes())
        .take(window)
        .filter(|(x, y)| x == y)
        .count();
    let suffix_matches = a
        .bytes()
        .rev()
        .zip(b.bytes().rev())
        .take(window)
        .filter(|(x, y)| x == y)
        .count();

    let prefix_ratio = prefix_matches as f64 / window as f64;
    let suffix_ratio = suffix_matches as f64 / window as f64;

    SIMILARITY_PREFIX_WEIGHT * prefix_ratio + SIMILARITY_SUFFIX_WEIGHT * suffix_ratio
}

/// Composite address risk score in [0, 100].
///
/// Five bounded terms — mixer contacts, high-risk counterparties, USD
/// volume tier, transaction velocity, cross-chain activity — are combined
/// by the configured weights. Negative volume or velocity inputs are
/// clamped to zero.
pub fn address_risk(
    config: &RiskScoringConfig,
    mixer_interactions: usize,
    high_risk_counterparties: usize,
    volume_usd: f64,
    velocity_per_day: f64,
    cross_chain_count: usize,
) -> f64 {
    let volume_usd = volume_usd.max(0.0);
    let velocity_per_day = velocity_per_day.max(0.0);

    let mixer_term =
        (mixer_interactions as f64 * config.mixer_per_interaction).min(config.mixer_cap);
    let counterparty_term = (high_risk_counterparties as f64 * config.counterparty_per_contact)
        .min(config.counterparty_cap);
    let volume_term = volume_tier_score(config, volume_usd) * config.volume_scale;
    let velocity_term = (velocity_per_day * config.velocity_per_tx_day).min(config.velocity_cap);
    let cross_chain_term =
        (cross_chain_count as f64 * config.cross_chain_per_tx).min(config.cross_chain_cap);

    let score = mixer_term * config.mixer_weight
        + counterparty_term * config.counterparty_weight
        + volume_term * config.volume_weight
        + velocity_term * config.velocity_weight
        + cross_chain_term * config.cross_chain_weight;

    score.clamp(0.0, 100.0)
}

/// Raw tier score for a USD volume: the score of the smallest breakpoint at
/// or above the volume, saturating at the top tier. Zero volume scores zero.
fn volume_tier_score(config: &RiskScoringConfig, volume_usd: f64) -> f64 {
    if volume_usd <= 0.0 {
        return 0.0;
    }
    for (breakpoint, score) in config
        .volume_breakpoints
        .iter()
        .zip(&config.volume_scores)
    {
        if volume_usd <= *breakpoint {
            return *score;
        }
    }
    config.volume_scores.last().copied().unwrap_or(0.0)
}

/// Filter dust-sized transfers and keep only tokens used often enough to
/// look like a deliberate dusting campaign.
///
/// A transfer is dust when its amount magnitude is below `dust_threshold`;
/// a token is flagged when it accounts for at least `min_dust_transfers`
/// dust rows. Returns the dust rows of flagged tokens only.
pub fn detect_dusting(
    transfers: &[TokenTransferRecord],
    dust_threshold: f64,
    min_dust_transfers: usize,
) -> Vec<TokenTransferRecord> {
    let dust: Vec<&TokenTransferRecord> = transfers
        .iter()
        .filter(|t| t.amount_change.abs() < dust_threshold)
        .collect();

    let mut per_token: BTreeMap<&str, usize> = BTreeMap::new();
    for transfer in &dust {
        *per_token.entry(transfer.mint.as_str()).or_insert(0) += 1;
    }

    let flagged: BTreeSet<&str> = per_token
        .into_iter()
        .filter(|(_, count)| *count >= min_dust_transfers)
        .map(|(mint, _)| mint)
        .collect();

    let rows: Vec<TokenTransferRecord> = dust
        .into_iter()
        .filter(|t| flagged.contains(t.mint.as_str()))
        .cloned()
        .collect();

    debug!(
        dust_rows = rows.len(),
        flagged_tokens = flagged.len(),
        "dusting detection complete"
    );
    rows
}

/// Find counterparty addresses visually similar to `target` — candidates
/// for an address-poisoning attack.
///
/// Every owner and token-account address in the history is scored against
/// `target`; matches at or above `similarity_threshold` are returned with
/// how often and how recently they appeared, most similar first.
pub fn detect_address_poisoning(
    target: &str,
    transaction_history: &[TokenTransferRecord],
    similarity_threshold: f64,
) -> Vec<PoisoningMatch> {
    let mut seen: BTreeMap<&str, (usize, DateTime<Utc>)> = BTreeMap::new();

    for record in transaction_history {
        for address in [record.owner.as_str(), record.token_account.as_str()] {
            if address.is_empty() || address == target {
                continue;
            }
            let entry = seen.entry(address).or_insert((0, record.block_time));
            entry.0 += 1;
            if record.block_time > entry.1 {
                entry.1 = record.block_time;
            }
        }
    }

    let mut matches: Vec<PoisoningMatch> = seen
        .into_iter()
        .filter_map(|(address, (count, last_seen))| {
            let similarity = address_similarity(target, address);
            (similarity >= similarity_threshold).then(|| PoisoningMatch {
                similar_address: address.to_string(),
                similarity,
                transaction_count: count,
                last_seen,
            })
        })
        .collect();

    matches.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.similar_address.cmp(&b.similar_address))
    });

    debug!(matches = matches.len(), "address poisoning scan complete");
    matches
}

/// Combined dusting/poisoning risk in [0, 100]: each detector contributes a
/// capped linear term.
pub fn combined_risk(
    config: &RiskScoringConfig,
    dusting_flag_count: usize,
    poisoning_flag_count: usize,
) -> f64 {
    let dusting = (dusting_flag_count as f64 * config.dusting_per_flag).min(config.dusting_cap);
    let poisoning =
        (poisoning_flag_count as f64 * config.poisoning_per_flag).min(config.poisoning_cap);
    (dusting + poisoning).min(100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schemas::TransferDirection;
    use chrono::TimeZone;

    fn config() -> RiskScoringConfig {
        RiskScoringConfig::default()
    }

    fn transfer(owner: &str, counterparty: &str, mint: &str, amount: f64, secs: i64) -> TokenTransferRecord {
        TokenTransferRecord {
            owner: owner.to_string(),
            token_account: counterparty.to_string(),
            direction: TransferDirection::Received,
            mint: mint.to_string(),
            amount_change: amount,
            block_time: Utc.timestamp_opt(secs, 0).unwrap(),
            signature: format!("sig-{secs}"),
            amount_usd: None,
        }
    }

    // ------------------------------------------------------------------
    // address_similarity
    // ------------------------------------------------------------------

    #[test]
    fn test_similarity_identity() {
        for addr in ["a", "9WzDXwBbmkg8ZTbNMqUxvQRAyrZzDsGYdLVL9zYtAWWM", "0x12"] {
            assert_eq!(address_similarity(addr, addr), 1.0);
        }
    }

    #[test]
    fn test_similarity_symmetry() {
        let pairs = [
            ("9WzDXwBbmkg8ZTbNMqUxvQRAyrZzDsGYdLVL9zYtAWWM", "9WzDXwBbmkg8ZTbNMqUxvQRAyrZzDsGYdLVL9zYtAWWN"),
            ("abcdef", "abzzzf"),
            ("short", "muchlongeraddress"),
        ];
        for (a, b) in pairs {
            assert_eq!(address_similarity(a, b), address_similarity(b, a));
        }
    }

    #[test]
    fn test_similarity_empty_is_zero() {
        assert_eq!(address_similarity("", "abc"), 0.0);
        assert_eq!(address_similarity("abc", ""), 0.0);
        assert_eq!(address_similarity("", ""), 0.0);
    }

    #[test]
    fn test_similarity_prefix_weighted_heavier_than_suffix() {
        // Same 8-char prefix, different tail vs same 8-char suffix,
        // different head
        let prefix_match = address_similarity("AAAABBBBxxxxxxxx", "AAAABBBByyyyyyyy");
        let suffix_match = address_similarity("xxxxxxxxAAAABBBB", "yyyyyyyyAAAABBBB");
        assert!((prefix_match - 0.6).abs() < 1e-9);
        assert!((suffix_match - 0.4).abs() < 1e-9);
        assert!(prefix_match > suffix_match);
    }

    #[test]
    fn test_similarity_poisoned_lookalike_scores_high() {
        // Typical poisoning forgery: matching head and tail, scrambled middle
        let victim_peer = "9WzDXwBbmkg8ZTbNMqUxvQRAyrZzDsGYdLVL9zYtAWWM";
        let forged = "9WzDXwBbQQQQQQQQQQQQQQQQQQQQQQQQQQQQ9zYtAWWM";
        let score = address_similarity(victim_peer, forged);
        assert!(score > 0.9, "score was {score}");
    }

    // ------------------------------------------------------------------
    // address_risk
    // ------------------------------------------------------------------

    #[test]
    fn test_address_risk_regression_fixture() {
        // mixer 70, counterparty 20, volume 30*0.25 = 7.5, velocity 6,
        // cross-chain 4; weighted: 21 + 4 + 1.5 + 1.2 + 0.4
        let score = address_risk(&config(), 5, 2, 75_000.0, 4.0, 1);
        assert!((score - 28.1).abs() < 1e-9, "score was {score}");
    }

    #[test]
    fn test_address_risk_zero_inputs_score_zero() {
        assert_eq!(address_risk(&config(), 0, 0, 0.0, 0.0, 0), 0.0);
    }

    #[test]
    fn test_address_risk_clamps_negative_inputs() {
        assert_eq!(address_risk(&config(), 0, 0, -5000.0, -3.0, 0), 0.0);
    }

    #[test]
    fn test_address_risk_monotone_in_each_input() {
        let cfg = config();
        let base = (3usize, 2usize, 60_000.0f64, 5.0f64, 1usize);
        let score = |m, c, vol, vel, x| address_risk(&cfg, m, c, vol, vel, x);
        let baseline = score(base.0, base.1, base.2, base.3, base.4);

        assert!(score(base.0 + 5, base.1, base.2, base.3, base.4) >= baseline);
        assert!(score(base.0, base.1 + 5, base.2, base.3, base.4) >= baseline);
        assert!(score(base.0, base.1, base.2 * 100.0, base.3, base.4) >= baseline);
        assert!(score(base.0, base.1, base.2, base.3 + 50.0, base.4) >= baseline);
        assert!(score(base.0, base.1, base.2, base.3, base.4 + 9) >= baseline);
    }

    #[test]
    fn test_address_risk_always_bounded() {
        let cfg = config();
        let extremes = [
            (0, 0, 0.0, 0.0, 0),
            (1000, 1000, 1e12, 1e6, 1000),
            (1, 0, 9_999.0, 0.1, 0),
        ];
        for (m, c, vol, vel, x) in extremes {
            let score = address_risk(&cfg, m, c, vol, vel, x);
            assert!((0.0..=100.0).contains(&score), "score was {score}");
        }
    }

    #[test]
    fn test_volume_tier_lookup() {
        let cfg = config();
        assert_eq!(volume_tier_score(&cfg, 0.0), 0.0);
        assert_eq!(volume_tier_score(&cfg, 5_000.0), 10.0);
        assert_eq!(volume_tier_score(&cfg, 10_000.0), 10.0);
        assert_eq!(volume_tier_score(&cfg, 75_000.0), 30.0);
        assert_eq!(volume_tier_score(&cfg, 600_000.0), 50.0);
        assert_eq!(volume_tier_score(&cfg, 5_000_000.0), 50.0);
    }

    // ------------------------------------------------------------------
    // detect_dusting
    // ------------------------------------------------------------------

    #[test]
    fn test_dusting_threshold_on_transfer_count() {
        let transfers: Vec<_> = (0..15)
            .map(|i| transfer("victim", &format!("duster{i}"), "mintD", 0.001, i))
            .collect();

        let flagged = detect_dusting(&transfers, 0.01, 10);
        assert_eq!(flagged.len(), 15);

        let not_flagged = detect_dusting(&transfers, 0.01, 20);
        assert!(not_flagged.is_empty());
    }

    #[test]
    fn test_dusting_keeps_only_flagged_tokens() {
        let mut transfers: Vec<_> = (0..5)
            .map(|i| transfer("victim", "duster", "mintA", 0.001, i))
            .collect();
        transfers.push(transfer("victim", "peer", "mintB", 0.001, 100));
        // Non-dust row of a flagged token stays out
        transfers.push(transfer("victim", "peer", "mintA", 50.0, 101));

        let flagged = detect_dusting(&transfers, 0.01, 3);
        assert_eq!(flagged.len(), 5);
        assert!(flagged.iter().all(|t| t.mint == "mintA"));
        assert!(flagged.iter().all(|t| t.amount_change < 0.01));
    }

    #[test]
    fn test_dusting_uses_amount_magnitude() {
        let transfers = vec![
            transfer("victim", "duster", "mintA", -0.001, 0),
            transfer("victim", "duster", "mintA", 0.001, 1),
            // Large sent amount is not dust even though it is negative
            transfer("victim", "peer", "mintA", -500.0, 2),
        ];
        let flagged = detect_dusting(&transfers, 0.01, 2);
        assert_eq!(flagged.len(), 2);
    }

    #[test]
    fn test_dusting_empty_input() {
        assert!(detect_dusting(&[], 0.01, 1).is_empty());
    }

    // ------------------------------------------------------------------
    // detect_address_poisoning
    // ------------------------------------------------------------------

    #[test]
    fn test_poisoning_detects_lookalike_counterparty() {
        let target = "9WzDXwBbmkg8ZTbNMqUxvQRAyrZzDsGYdLVL9zYtAWWM";
        let forged = "9WzDXwBbQQQQQQQQQQQQQQQQQQQQQQQQQQQQ9zYtAWWM";
        let honest = "4k3Dyjzvzp8eMZWUXbBCjEvwSkkk59S5iCNLY3QrkX6R";

        let history = vec![
            transfer(target, forged, "mintA", 0.0001, 10),
            transfer(target, forged, "mintA", 0.0001, 30),
            transfer(target, honest, "mintA", 25.0, 20),
        ];

        let matches = detect_address_poisoning(target, &history, 0.8);
        assert_eq!(matches.len(), 1);

        let hit = &matches[0];
        assert_eq!(hit.similar_address, forged);
        assert_eq!(hit.transaction_count, 2);
        assert_eq!(hit.last_seen, Utc.timestamp_opt(30, 0).unwrap());
        assert!(hit.similarity >= 0.8);
    }

    #[test]
    fn test_poisoning_excludes_target_itself() {
        let target = "sametarget";
        let history = vec![transfer(target, target, "mintA", 1.0, 0)];
        assert!(detect_address_poisoning(target, &history, 0.1).is_empty());
    }

    #[test]
    fn test_poisoning_orders_by_similarity() {
        let target = "AAAABBBBCCCCDDDD";
        let close = "AAAABBBBCCCCDDDX";
        let far = "AAAAZZZZZZZZDDDD";

        let history = vec![
            transfer(target, far, "mintA", 1.0, 0),
            transfer(target, close, "mintA", 1.0, 1),
        ];

        let matches = detect_address_poisoning(target, &history, 0.3);
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].similar_address, close);
        assert!(matches[0].similarity > matches[1].similarity);
    }

    // ------------------------------------------------------------------
    // combined_risk
    // ------------------------------------------------------------------

    #[test]
    fn test_combined_risk_terms_and_caps() {
        let cfg = config();
        assert_eq!(combined_risk(&cfg, 0, 0), 0.0);
        // 2*12 + 3*10
        assert_eq!(combined_risk(&cfg, 2, 3), 54.0);
        // Dusting capped at 50, poisoning capped at 70, total capped at 100
        assert_eq!(combined_risk(&cfg, 100, 0), 50.0);
        assert_eq!(combined_risk(&cfg, 0, 100), 70.0);
        assert_eq!(combined_risk(&cfg, 100, 100), 100.0);
    }
}
