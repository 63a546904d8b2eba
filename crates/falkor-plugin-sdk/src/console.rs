use std::net::SocketAddr;

use colored::Colorize;

/// URI scheme the Falkor desktop app registers for one-click installs.
pub const INSTALL_SCHEME: &str = "falkor";

pub fn install_link(api_url: &str) -> String {
    format!("{INSTALL_SCHEME}://install-plugin/{api_url}/setup.json")
}

/// Operator lines printed once the plugin is serving. The listening line is
/// debug-only; the install link is always emitted.
pub(crate) fn announce_startup(debug: bool, addr: SocketAddr, api_url: &str, link: &str) {
    if debug {
        tracing::info!(
            addr = %addr,
            "{} {}",
            "[plugin] Listening on".green().bold(),
            api_url
        );
    }
    tracing::info!("{} {}", "[plugin] Install via:".cyan().bold(), link);
}
