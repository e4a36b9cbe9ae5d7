//! Traceroute capability - best-effort path enrichment for alerts

use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

const TRACEROUTE_TIMEOUT: Duration = Duration::from_secs(60);

/// Traceroute capability. Always yields text; failures are described
/// in the output rather than propagated.
pub trait Tracer: Send + Sync {
    fn trace(
        &self,
        address: &str,
        max_hops: u32,
    ) -> impl std::future::Future<Output = String> + Send;
}

/// Runs the platform traceroute binary.
pub struct SystemTraceroute;

impl Tracer for SystemTraceroute {
    async fn trace(&self, address: &str, max_hops: u32) -> String {
        let (program, hops_flag) = if cfg!(target_os = "windows") {
            ("tracert", "-h")
        } else {
            ("traceroute", "-m")
        };

        debug!("Running {} to {} (max {} hops)", program, address, max_hops);

        let output = tokio::time::timeout(
            TRACEROUTE_TIMEOUT,
            Command::new(program)
                .arg(hops_flag)
                .arg(max_hops.to_string())
                .arg(address)
                .output(),
        )
        .await;

        match output {
            Ok(Ok(output)) => {
                let stdout = String::from_utf8_lossy(&output.stdout);
                if !stdout.trim().is_empty() {
                    return stdout.into_owned();
                }
                let stderr = String::from_utf8_lossy(&output.stderr);
                if !stderr.trim().is_empty() {
                    return stderr.into_owned();
                }
                "Traceroute produced no output.".to_string()
            }
            Ok(Err(e)) => format!("Traceroute failed: {}", e),
            Err(_) => format!("Traceroute failed: timeout after {:?}", TRACEROUTE_TIMEOUT),
        }
    }
}
