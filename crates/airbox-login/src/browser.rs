//! Browser launch

use tracing::debug;

/// Opens the authorization URL for the user.
///
/// Launch failures are not fatal to the login: the CLI prints the URL so
/// the user can open it by hand.
pub trait BrowserLauncher: Send + Sync {
    fn launch(&self, url: &str) -> std::io::Result<()>;
}

/// Opens the system default browser.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemBrowser;

impl BrowserLauncher for SystemBrowser {
    fn launch(&self, url: &str) -> std::io::Result<()> {
        debug!("opening system browser");
        open::that_detached(url)
    }
}

/// Does nothing; for SSH sessions and `--no-browser`, where the user opens
/// the printed URL themselves.
#[derive(Debug, Default, Clone, Copy)]
pub struct ManualBrowser;

impl BrowserLauncher for ManualBrowser {
    fn launch(&self, _url: &str) -> std::io::Result<()> {
        Ok(())
    }
}
