use anyhow::{Context, Result, anyhow};
use gui_pilot::{BrowserSurface, DesktopSurface, InputSurface, Resolution};
use headless_chrome::{Browser, LaunchOptions};
use std::ffi::OsStr;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

const DEVTOOLS_URL: &str = "http://127.0.0.1:9222";

#[derive(Debug, Clone)]
pub struct BrowserOptions {
    pub headless: bool,
    pub start_url: Option<String>,
    pub window: Option<Resolution>,
}

/// Attaches to a Chrome already listening on the DevTools port, or launches
/// one. Either way the task gets a tab of its own. Blocking.
pub fn launch_browser(options: &BrowserOptions) -> Result<BrowserSurface> {
    info!("Attempting to attach to existing Chrome on {}", DEVTOOLS_URL);
    let browser = match Browser::connect(DEVTOOLS_URL.to_string()) {
        Ok(browser) => {
            info!("Attached to existing Chrome");
            browser
        }
        Err(e) => {
            info!("Could not attach ({}), launching Chrome", e);
            let path = find_chrome()?;
            let launch = LaunchOptions {
                headless: options.headless,
                path: Some(path),
                window_size: options.window.map(|r| (r.width, r.height)),
                args: vec![
                    OsStr::new("--no-first-run"),
                    OsStr::new("--no-default-browser-check"),
                    OsStr::new("--password-store=basic"),
                ],
                idle_browser_timeout: Duration::from_secs(300),
                ..Default::default()
            };
            Browser::new(launch).map_err(|e| anyhow!("Browser launch failed: {}", e))?
        }
    };

    let tab = browser.new_tab().context("opening a tab")?;
    let url = options.start_url.as_deref().unwrap_or("about:blank");
    tab.navigate_to(url)
        .and_then(|t| t.wait_until_navigated())
        .with_context(|| format!("opening {}", url))?;
    info!("Chrome ready on {}", url);

    Ok(BrowserSurface::new(browser, tab))
}

pub async fn open_browser(options: BrowserOptions) -> Result<Box<dyn InputSurface>> {
    let surface = tokio::task::spawn_blocking(move || launch_browser(&options))
        .await
        .map_err(|e| anyhow!("Browser launch panicked: {}", e))??;
    Ok(Box::new(surface))
}

pub async fn open_desktop(size: Option<Resolution>) -> Result<Box<dyn InputSurface>> {
    let surface = DesktopSurface::open(size).await?;
    Ok(Box::new(surface))
}

fn find_chrome() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("CHROME_PATH") {
        return Ok(PathBuf::from(path));
    }

    let candidates = [
        "/usr/bin/google-chrome",
        "/usr/bin/google-chrome-stable",
        "/usr/bin/chromium",
        "/usr/bin/chromium-browser",
        "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
        "/Applications/Chromium.app/Contents/MacOS/Chromium",
        r"C:\Program Files\Google\Chrome\Application\chrome.exe",
        r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
    ];
    for path in &candidates {
        let p = PathBuf::from(path);
        if p.exists() {
            return Ok(p);
        }
    }

    headless_chrome::browser::default_executable().map_err(|e| {
        warn!("No Chrome found in the usual locations");
        anyhow!("Chrome executable not found ({}). Install Chrome or set CHROME_PATH.", e)
    })
}
