//! The `quizsync init` command.

use anyhow::Result;

pub fn execute() -> Result<()> {
    if std::path::Path::new("quizsync.toml").exists() {
        println!("quizsync.toml already exists, skipping.");
    } else {
        std::fs::write("quizsync.toml", SAMPLE_CONFIG)?;
        println!("Created quizsync.toml");
    }

    println!("\nNext steps:");
    println!("  1. Fill in the [remote] table with your Firebase project settings");
    println!("  2. Run: quizsync save --score 8 --total 10 --subject history");
    println!("  3. Run: quizsync stats");

    Ok(())
}

const SAMPLE_CONFIG: &str = r#"# quizsync configuration

data_dir = "./.quizsync"
history_key = "upsc_history"
question_base_url = "http://localhost:8080"
request_timeout_secs = 30
sync_parallelism = 4

# Leave the placeholders in place to run offline.
[remote]
type = "firestore"
project_id = "your-project-id"
api_key = "YOUR_API_KEY_HERE"
auth_domain = "your-project-id.firebaseapp.com"
storage_bucket = "your-project-id.appspot.com"
messaging_sender_id = "123456789"
app_id = "1:123456789:web:abcdef123456"
# base_url = "https://firestore.googleapis.com"
# auth_token = "${QUIZSYNC_AUTH_TOKEN}"
"#;
