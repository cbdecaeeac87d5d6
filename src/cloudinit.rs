//! Bootstrap Payload Generation
//!
//! Renders the cloud-init document a freshly launched scanner instance
//! consumes at first boot. The payload is self-contained: it writes the
//! scanner CLI configuration to disk and starts the scanner container
//! against the callback server, with no external fetch beyond what the
//! image itself does.

use base64::{engine::general_purpose::STANDARD, Engine as _};

use crate::error::SkyscanError;

const CONFIG_PATH: &str = "/opt/skyscan/scanner-config.yaml";

/// Inputs embedded into the first-boot payload.
#[derive(Debug, Clone)]
pub struct BootstrapData {
    /// Scanner CLI configuration, written verbatim to the instance.
    pub scanner_cli_config: String,
    /// Scanner container image reference.
    pub scanner_image: String,
    /// Callback server address the scanner reports results to.
    pub server_address: String,
    /// Correlation id for the scan result being produced.
    pub scan_result_id: String,
}

/// Render the cloud-init user data for one scanner launch.
pub fn render(data: &BootstrapData) -> Result<String, SkyscanError> {
    if data.scanner_image.is_empty() {
        return Err(SkyscanError::provisioning(
            "generate bootstrap payload",
            anyhow::anyhow!("scanner image is empty"),
        ));
    }
    if data.server_address.is_empty() {
        return Err(SkyscanError::provisioning(
            "generate bootstrap payload",
            anyhow::anyhow!("server address is empty"),
        ));
    }
    if data.scan_result_id.is_empty() {
        return Err(SkyscanError::provisioning(
            "generate bootstrap payload",
            anyhow::anyhow!("scan result id is empty"),
        ));
    }

    Ok(format!(
        r#"#cloud-config
write_files:
  - path: {config_path}
    permissions: "0644"
    content: |
{config}
runcmd:
  - docker run --rm --name skyscan-scanner -v /opt/skyscan:/opt/skyscan {image} scan --config {config_path} --server {server} --scan-result-id {scan_result_id}
"#,
        config_path = CONFIG_PATH,
        config = indent(&data.scanner_cli_config, 6),
        image = data.scanner_image,
        server = data.server_address,
        scan_result_id = data.scan_result_id,
    ))
}

/// Encode rendered user data per the EC2 user-data transport contract.
pub fn encode_user_data(user_data: &str) -> String {
    STANDARD.encode(user_data)
}

fn indent(text: &str, spaces: usize) -> String {
    let pad = " ".repeat(spaces);
    text.lines()
        .map(|line| format!("{pad}{line}"))
        .collect::<Vec<_>>()
        .join("\n")
}
