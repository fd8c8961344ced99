//! # ENC Service Live Runner
//!
//! Drives a running `server_enc` over its RPC port:
//!
//! 1. Replaces the override classes of a node.
//! 2. Fetches them back as JSON and as the text form.
//! 3. Sends a few broken requests and checks the error replies.
//!
//! Start the service with `--serve-mode forever` (or once per run) and point
//! `--db-path` at a writable directory.

use anyhow::{Result, bail, ensure};
use clap::Parser;
use lib_common::protocols::enc_rpc::{Args, EncClient, FetchQuery, PostedData, VERB_FETCH};

#[derive(Parser, Debug)]
#[clap(about = "Live replace/fetch checks against a running ENC service")]
struct Cli {
    #[clap(long, default_value = "127.0.0.1:4000", help = "Address of the ENC service.")]
    addr: String,

    #[clap(long, help = "Private database location handed to the service.")]
    db_path: String,

    #[clap(long, default_value = "enc-runner-node", help = "Node identifier to write.")]
    salt_id: String,

    #[clap(long, default_value = "DC1")]
    dc: String,

    #[clap(long, default_value = "prod")]
    env: String,

    #[clap(long, default_value = "v1")]
    version: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    println!("--- ENC live runner against {} ---", cli.addr);

    let mut client = EncClient::connect(cli.addr.as_str()).await?;

    // --- TEST 1: Replace ---
    let body = PostedData {
        classes: vec!["app".to_string(), "web.init".to_string()],
        dc: cli.dc.clone(),
        environment: cli.env.clone(),
    };
    let reply = client.replace(&cli.db_path, &cli.salt_id, "1", &body).await?;
    if !reply.is_success() {
        bail!("replace failed: {}", reply.plugin_error);
    }
    println!("[ok] replace");

    // --- TEST 2: Fetch as JSON ---
    let mut query = FetchQuery {
        salt_id: cli.salt_id.clone(),
        dc: cli.dc.clone(),
        env: cli.env.clone(),
        version: cli.version.clone(),
        yaml: false,
    };
    let reply = client.fetch(&cli.db_path, &query).await?;
    ensure!(reply.is_success(), "fetch failed: {}", reply.plugin_error);
    let json: serde_json::Value = serde_json::from_str(&reply.enc_data)?;
    ensure!(json["classes"] == serde_json::json!(["app", "web.init"]), "unexpected classes: {}", json);
    ensure!(json["customised"] == true, "overrides should be flagged as customised");
    ensure!(json["environment"] == cli.env.as_str(), "unexpected environment: {}", json);
    println!("[ok] fetch json: {}", reply.enc_data);

    // --- TEST 3: Fetch as text ---
    query.yaml = true;
    let reply = client.fetch(&cli.db_path, &query).await?;
    ensure!(reply.is_success(), "fetch failed: {}", reply.plugin_error);
    let expected_env = format!("environment: {}_{}", cli.env, cli.version);
    ensure!(reply.enc_data.ends_with(&expected_env), "unexpected text form: {}", reply.enc_data);
    println!("[ok] fetch yaml:\n{}", reply.enc_data);

    // --- TEST 4: Validation errors ---
    let reply = client.call(&Args::new(VERB_FETCH)).await?;
    ensure!(reply.plugin_error == "The dc must be set", "unexpected error: {}", reply.plugin_error);
    let reply = client.call(&Args::new("PATCH")).await?;
    ensure!(!reply.is_success() && reply.enc_data.is_empty(), "unknown verb must fail");
    println!("[ok] error replies");

    println!("--- All ENC checks passed ---");
    Ok(())
}
