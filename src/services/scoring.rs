use crate::config::EngineConfig;
use crate::models::ManualPayment;

/// Outcome of the heuristic scoring pass. `reasons` lists every condition
/// that forfeited points, for audit and for the review screens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoreReport {
    pub score: u8,
    pub reasons: Vec<String>,
}

impl ScoreReport {
    pub fn is_auto_approve_candidate(&self, engine: &EngineConfig) -> bool {
        self.score >= engine.auto_approve_threshold
    }
}

/// Score a submitted payment from its metadata alone. Deterministic and
/// free of I/O; the point allocation sums to 100:
///
///   30  transaction hash present and shaped like the chain expects
///   20  sender wallet address present
///   25  sender wallet address passes chain format validation
///   25  amount at or under the large-amount cutoff
pub fn score(payment: &ManualPayment, engine: &EngineConfig) -> ScoreReport {
    let mut score = 0u8;
    let mut reasons = Vec::new();

    match &payment.transaction_hash {
        Some(hash) if payment.chain.valid_tx_hash(hash) => score += 30,
        Some(_) => reasons.push(format!(
            "Transaction hash does not match the {} format",
            payment.chain
        )),
        None => reasons.push("Transaction hash not provided".to_string()),
    }

    match &payment.sender_wallet_address {
        Some(addr) => {
            score += 20;
            if payment.chain.valid_address(addr) {
                score += 25;
            } else {
                reasons.push(format!(
                    "Sender wallet address does not match the {} format",
                    payment.chain
                ));
            }
        }
        None => reasons.push("Sender wallet address not provided".to_string()),
    }

    if payment.amount_usd <= engine.large_amount_cutoff_usd {
        score += 25;
    } else {
        reasons.push(format!(
            "Amount {} USD exceeds the large-amount cutoff of {} USD",
            payment.amount_usd, engine.large_amount_cutoff_usd
        ));
    }

    ScoreReport { score, reasons }
}
