use anyhow::Result;
use serde_json::json;
use tx_sentinel::client::api::SentinelClient;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    // Load configuration
    dotenvy::dotenv().ok();

    let base_url =
        std::env::var("SENTINEL_URL").unwrap_or_else(|_| "http://localhost:8080".to_string());
    let chain = std::env::var("PROBE_CHAIN").unwrap_or_else(|_| "bsc".to_string());
    let tx_hash = std::env::var("PROBE_TX_HASH").ok();
    let sender = std::env::var("PROBE_SENDER").ok();
    let amount = std::env::var("PROBE_AMOUNT_USD").unwrap_or_else(|_| "1000".to_string());

    println!("tx-sentinel probe");
    println!("=================");
    println!("Server: {}", base_url);
    println!("Chain:  {}", chain);
    println!();

    let client = SentinelClient::new(&base_url);

    println!("Step 1: Submitting payment...");
    let submission = client
        .submit_payment(&json!({
            "user_id": "probe",
            "amount_usd": amount,
            "chain": chain,
            "transaction_hash": tx_hash,
            "sender_wallet_address": sender,
            "sender_name": "Probe",
        }))
        .await?;

    let payment_id = submission["data"]["payment_id"]
        .as_str()
        .ok_or_else(|| anyhow::anyhow!("No payment_id in response"))?
        .to_string();
    println!("   [OK] Accepted as {}", payment_id);
    println!(
        "   Initial confidence: {}",
        submission["data"]["confidence"]
    );
    println!();

    println!("Step 2: Waiting for the verification pass...");
    let mut last_status = String::new();
    for _ in 0..15 {
        tokio::time::sleep(std::time::Duration::from_secs(2)).await;
        let detail = client.payment_detail(&payment_id).await?;
        let status = detail["data"]["result"]["verification_status"]
            .as_str()
            .unwrap_or("unknown")
            .to_string();
        if status != last_status {
            println!("   Status: {}", status);
            last_status = status.clone();
        }
        if status != "pending" {
            println!();
            println!("Verification result:");
            println!("{}", serde_json::to_string_pretty(&detail["data"]["result"])?);
            break;
        }
    }

    println!();
    println!("Step 3: Triggering a re-check (idempotent)...");
    let triggered = client.trigger_verification(&payment_id).await?;
    println!("   Queued: {}", triggered["data"]["queued"]);

    println!();
    println!("Step 4: Fetching aggregate stats...");
    let stats = client.stats().await?;
    println!("{}", serde_json::to_string_pretty(&stats)?);

    Ok(())
}
