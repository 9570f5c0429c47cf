use nanobanana::{
    logger, Credentials, ExpectedAuthCode, NanoBananaNode, NodeParameters, ReqwestTransport,
    WorkItem,
};
use std::env;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let dotenv_loaded = dotenv::dotenv().is_ok();

    logger::init_with_config(logger::LoggerConfig::from_env())?;
    if dotenv_loaded {
        log::info!("✅ .env file loaded successfully");
    } else {
        log::warn!("⚠️  No .env file found, using system environment variables");
    }
    logger::log_startup_info(env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));

    let credentials = Credentials::from_env();
    let params = NodeParameters::from_env()?;
    logger::log_config_info(&credentials, &params);

    let mut node = NanoBananaNode::new(credentials, Arc::new(ReqwestTransport::new()))
        .with_continue_on_fail(env::var("NANOBANANA_CONTINUE_ON_FAIL").map_or(false, |v| v == "true"));
    if let Ok(code) = env::var("NANOBANANA_EXPECTED_AUTH_CODE") {
        node = node.with_credential_check(Arc::new(ExpectedAuthCode(code)));
    }

    let outputs = match node.execute(&[WorkItem::new()], &params).await {
        Ok(outputs) => outputs,
        Err(e) => {
            log::error!("❌ Generation failed: {}", e);
            return Err(e.into());
        }
    };

    let output_dir = PathBuf::from(env::var("NANOBANANA_OUTPUT_DIR").unwrap_or_else(|_| ".".into()));
    for output in &outputs {
        for (key, binary) in &output.binary {
            let file_name = binary.file_name.clone().unwrap_or_else(|| format!("{}.png", key));
            let path = output_dir.join(file_name);
            match binary.bytes() {
                Ok(bytes) => match fs::write(&path, &bytes) {
                    Ok(_) => log::info!("💾 Saved {} ({} bytes)", path.display(), bytes.len()),
                    Err(e) => log::error!("❌ Failed to write {}: {}", path.display(), e),
                },
                Err(e) => log::error!("❌ Attachment {} is not valid base64: {}", key, e),
            }
        }
    }

    let json: Vec<_> = outputs.iter().map(|output| &output.json).collect();
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
