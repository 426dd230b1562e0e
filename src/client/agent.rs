use agentlink::client::settlement::{settle_invoice, AuthorizationSigner, SettlementClient};
use agentlink::client::wallet::WalletClient;
use agentlink::models::{AnalysisResponse, PaymentChallenge};
use anyhow::{Context, Result};
use reqwest::Client;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    // Load configuration
    dotenvy::dotenv().ok();

    let target = std::env::args()
        .nth(1)
        .map(|s| s.to_ascii_uppercase())
        .unwrap_or_else(|| "PEPE".to_string());

    let seller_url = std::env::var("SELLER_URL")
        .unwrap_or_else(|_| "http://127.0.0.1:3000".to_string());
    let facilitator_url = std::env::var("FACILITATOR_URL").context("FACILITATOR_URL required")?;
    let private_key = std::env::var("BUYER_PRIVATE_KEY").context("BUYER_PRIVATE_KEY required")?;
    let rpc_url = std::env::var("CHAIN_RPC_URL")
        .unwrap_or_else(|_| "https://evm-t3.cronos.org".to_string());
    let chain_id: u64 = std::env::var("CHAIN_ID")
        .unwrap_or_else(|_| "338".to_string())
        .parse()
        .context("Invalid CHAIN_ID")?;
    let domain_name = std::env::var("TOKEN_DOMAIN_NAME").unwrap_or_else(|_| "USDC".to_string());
    let domain_version = std::env::var("TOKEN_DOMAIN_VERSION").unwrap_or_else(|_| "1".to_string());

    let wallet = WalletClient::new(&rpc_url, &private_key, chain_id)?;

    println!("AgentLink Buyer Agent");
    println!("=====================");
    println!("Wallet: {:?}", wallet.address());
    println!("Target: {}", target);
    println!("Seller: {}", seller_url);
    println!();

    let url = format!("{}/api/analyze/{}", seller_url, target);
    let http = Client::new();

    println!("Step 1: Requesting analysis (expecting 402)...");
    let response = http.get(&url).send().await?;

    if response.status() != reqwest::StatusCode::PAYMENT_REQUIRED {
        anyhow::bail!("Expected 402 Payment Required, got {}", response.status());
    }

    let challenge: PaymentChallenge = response.json().await?;
    println!(
        "   [OK] Invoice: {} {} -> {}",
        challenge.amount, challenge.currency, challenge.pay_to
    );

    let invoice = challenge.to_invoice(Duration::from_secs(3600))?;

    // Fail fast when the wallet cannot cover the invoice.
    let balance = wallet.token_balance(invoice.token).await?;
    if balance < invoice.amount {
        anyhow::bail!(
            "Insufficient token balance: {} < {} smallest units",
            balance,
            invoice.amount
        );
    }
    println!("   Token balance: {} units", balance);
    println!();

    println!("Step 2: Settling through the facilitator...");
    let signer = AuthorizationSigner {
        domain_name,
        domain_version,
        chain_id,
    };
    let facilitator = SettlementClient::new(&facilitator_url);
    let description = format!("Data: {}", target);

    let settlement = match settle_invoice(
        &signer,
        wallet.signer(),
        &facilitator,
        &invoice,
        &description,
    )
    .await
    {
        Ok(settlement) => settlement,
        Err(e) if e.is_retryable() => {
            println!("   Settlement hiccup ({}), retrying once...", e);
            tokio::time::sleep(Duration::from_secs(2)).await;
            settle_invoice(
                &signer,
                wallet.signer(),
                &facilitator,
                &invoice,
                &description,
            )
            .await?
        }
        Err(e) => return Err(e.into()),
    };

    println!("   [OK] Settled: {:?}", settlement.tx_hash);
    println!();

    println!("Step 3: Redeeming with payment proof...");
    let response = http
        .get(&url)
        .header("x-payment-hash", format!("{:?}", settlement.tx_hash))
        // The seller verifies on-chain before answering; give it room.
        .timeout(Duration::from_secs(60))
        .send()
        .await?;

    if !response.status().is_success() {
        let body = response.text().await?;
        anyhow::bail!("Request failed after settlement: {}", body);
    }

    println!("   [OK] Payment verified!");
    println!();

    let analysis: AnalysisResponse = response.json().await?;
    println!("Analysis for {}", analysis.token);
    println!("------------------------------------------------");
    println!("Source: {}", analysis.source);
    println!(
        "Price: ${} | Volume: {}",
        analysis.market_stats.price, analysis.market_stats.volume
    );
    if !analysis.data.is_empty() {
        println!("Signal: {}", analysis.data);
    }
    println!("Served by: {}", analysis.served_by);
    println!("------------------------------------------------");

    Ok(())
}
