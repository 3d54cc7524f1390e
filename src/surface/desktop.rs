//! OS-level pointer and keyboard through command-line helpers: xdotool on
//! Linux, cliclick on macOS. Screens are captured with ImageMagick `import`
//! (falling back to `scrot`) or `screencapture`.

use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{InputSurface, MouseButton, ScrollDirection};
use crate::error::SurfaceError;
use crate::keys::{CliclickKeys, Key, KeyInput, KeyTable, XdotoolKeys};
use crate::scaling::Resolution;
use crate::types::Point;

const CMD_TIMEOUT: Duration = Duration::from_secs(15);

/// Milliseconds between typed characters.
const TYPE_DELAY_MS: &str = "12";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DesktopTool {
    Xdotool,
    Cliclick,
}

impl DesktopTool {
    fn program(self) -> &'static str {
        match self {
            DesktopTool::Xdotool => "xdotool",
            DesktopTool::Cliclick => "cliclick",
        }
    }
}

pub struct DesktopSurface {
    tool: DesktopTool,
    size: Option<Resolution>,
    held: Option<MouseButton>,
}

impl DesktopSurface {
    /// Detects the input helper for this OS. `size_override` replaces the
    /// queried display geometry and is required with cliclick.
    pub async fn open(size_override: Option<Resolution>) -> Result<Self, SurfaceError> {
        let tool = if cfg!(target_os = "macos") {
            DesktopTool::Cliclick
        } else {
            DesktopTool::Xdotool
        };
        run("which", &[tool.program()]).await.map_err(|_| {
            SurfaceError::Unavailable(format!("{} not found on PATH", tool.program()))
        })?;
        info!("Desktop surface using {}", tool.program());
        Ok(Self {
            tool,
            size: size_override,
            held: None,
        })
    }

    pub fn tool(&self) -> DesktopTool {
        self.tool
    }

    async fn xdotool(&self, args: &[&str]) -> Result<String, SurfaceError> {
        run_text("xdotool", args).await
    }

    async fn cliclick(&self, commands: &[String]) -> Result<String, SurfaceError> {
        let args: Vec<&str> = commands.iter().map(String::as_str).collect();
        run_text("cliclick", &args).await
    }

    async fn pointer(&mut self) -> Result<Point, SurfaceError> {
        let raw = match self.tool {
            DesktopTool::Xdotool => self.xdotool(&["getmouselocation", "--shell"]).await?,
            DesktopTool::Cliclick => self.cliclick(&["p".to_string()]).await?,
        };
        parse_position(&raw)
            .ok_or_else(|| SurfaceError::primitive("read pointer", format!("unexpected output '{}'", raw)))
    }

    /// Captures into a temporary file for tools that cannot write to stdout.
    async fn capture_to_file(&self, program: &str, args: &[&str]) -> Result<Vec<u8>, SurfaceError> {
        let path = temp_png();
        let path_str = path.to_string_lossy().to_string();
        let mut full: Vec<&str> = args.to_vec();
        full.push(&path_str);
        run(program, &full).await?;
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| SurfaceError::primitive("capture", e));
        if let Err(e) = tokio::fs::remove_file(&path).await {
            debug!("Could not remove {}: {}", path.display(), e);
        }
        bytes
    }
}

fn temp_png() -> PathBuf {
    std::env::temp_dir().join(format!("gui-pilot-{}.png", uuid::Uuid::new_v4()))
}

/// Accepts xdotool's `X=..\nY=..` shell output and cliclick's `x,y`.
fn parse_position(raw: &str) -> Option<Point> {
    if raw.contains("X=") {
        let field = |name: &str| {
            raw.lines()
                .find_map(|l| l.trim().strip_prefix(name))
                .and_then(|v| v.trim().parse::<i64>().ok())
        };
        return Some(Point::new(field("X=")?, field("Y=")?));
    }
    let coords = raw.rsplit(':').next()?.trim();
    let (x, y) = coords.split_once(',')?;
    Some(Point::new(x.trim().parse().ok()?, y.trim().parse().ok()?))
}

fn xdotool_button(button: MouseButton) -> &'static str {
    match button {
        MouseButton::Left => "1",
        MouseButton::Middle => "2",
        MouseButton::Right => "3",
    }
}

fn xdotool_combo(key: &KeyInput) -> String {
    match key {
        KeyInput::Combo(combo) => combo
            .modifiers
            .iter()
            .map(|m| XdotoolKeys.modifier(*m).to_string())
            .chain(std::iter::once(XdotoolKeys.key(combo.key)))
            .collect::<Vec<_>>()
            .join("+"),
        KeyInput::Raw(raw) => raw.clone(),
    }
}

/// `kd:` modifiers, the key, then `ku:` in reverse order.
fn cliclick_combo(key: &KeyInput) -> Vec<String> {
    let combo = match key {
        KeyInput::Combo(combo) => combo,
        KeyInput::Raw(raw) => return vec![format!("kp:{}", raw.to_lowercase())],
    };
    let mods: Vec<&str> = combo.modifiers.iter().map(|m| CliclickKeys.modifier(*m)).collect();
    let main = match combo.key {
        Key::Char(c) => format!("t:{}", c),
        other => format!("kp:{}", CliclickKeys.key(other)),
    };
    let mut out = Vec::with_capacity(mods.len() * 2 + 1);
    if !mods.is_empty() {
        out.push(format!("kd:{}", mods.join(",")));
    }
    out.push(main);
    if !mods.is_empty() {
        let reversed: Vec<&str> = mods.iter().rev().copied().collect();
        out.push(format!("ku:{}", reversed.join(",")));
    }
    out
}

async fn run(program: &str, args: &[&str]) -> Result<Vec<u8>, SurfaceError> {
    debug!("{} {}", program, args.join(" "));
    let result = tokio::time::timeout(
        CMD_TIMEOUT,
        tokio::process::Command::new(program).args(args).output(),
    )
    .await;

    match result {
        Ok(Ok(output)) if output.status.success() => Ok(output.stdout),
        Ok(Ok(output)) => {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            if stderr.to_lowercase().contains("can't open display") {
                Err(SurfaceError::Unavailable(stderr))
            } else {
                Err(SurfaceError::Primitive {
                    op: "command",
                    message: format!("{} failed: {}", program, stderr),
                })
            }
        }
        Ok(Err(e)) => Err(SurfaceError::primitive("command", format!("failed to execute {}: {}", program, e))),
        Err(_) => Err(SurfaceError::primitive(
            "command",
            format!("{} timed out after {}s", program, CMD_TIMEOUT.as_secs()),
        )),
    }
}

async fn run_text(program: &str, args: &[&str]) -> Result<String, SurfaceError> {
    let out = run(program, args).await?;
    Ok(String::from_utf8_lossy(&out).trim().to_string())
}

#[async_trait]
impl InputSurface for DesktopSurface {
    fn name(&self) -> &'static str {
        self.tool.program()
    }

    async fn physical_size(&mut self) -> Result<Resolution, SurfaceError> {
        if let Some(size) = self.size {
            return Ok(size);
        }
        match self.tool {
            DesktopTool::Xdotool => {
                let raw = self
                    .xdotool(&["getdisplaygeometry"])
                    .await
                    .map_err(|e| SurfaceError::Unavailable(e.to_string()))?;
                let mut parts = raw.split_whitespace().map(str::parse::<u32>);
                match (parts.next(), parts.next()) {
                    (Some(Ok(w)), Some(Ok(h))) if w > 0 && h > 0 => {
                        let size = Resolution::new(w, h);
                        self.size = Some(size);
                        Ok(size)
                    }
                    _ => Err(SurfaceError::Unavailable(format!("unexpected display geometry '{}'", raw))),
                }
            }
            DesktopTool::Cliclick => Err(SurfaceError::Unavailable(
                "display size unknown; set WIDTH and HEIGHT".into(),
            )),
        }
    }

    async fn move_to(&mut self, to: Point) -> Result<(), SurfaceError> {
        let (x, y) = (to.x.to_string(), to.y.to_string());
        match self.tool {
            DesktopTool::Xdotool => {
                self.xdotool(&["mousemove", "--sync", &x, &y]).await?;
            }
            DesktopTool::Cliclick => {
                // A held button needs a drag-move or the drag is lost.
                let verb = if self.held.is_some() { "dm" } else { "m" };
                self.cliclick(&[format!("{}:{},{}", verb, x, y)]).await?;
            }
        }
        Ok(())
    }

    async fn click(&mut self, button: MouseButton, count: u32) -> Result<(), SurfaceError> {
        let count = count.max(1);
        match self.tool {
            DesktopTool::Xdotool => {
                let repeat = count.to_string();
                self.xdotool(&["click", "--repeat", &repeat, xdotool_button(button)])
                    .await?;
            }
            DesktopTool::Cliclick => {
                let command = match (button, count) {
                    (MouseButton::Left, 1) => "c:.",
                    (MouseButton::Left, 2) => "dc:.",
                    (MouseButton::Left, _) => "tc:.",
                    (MouseButton::Right, _) => "rc:.",
                    (MouseButton::Middle, _) => return Err(SurfaceError::Unsupported("middle click")),
                };
                self.cliclick(&[command.to_string()]).await?;
            }
        }
        Ok(())
    }

    async fn button_down(&mut self, button: MouseButton) -> Result<(), SurfaceError> {
        match self.tool {
            DesktopTool::Xdotool => {
                self.xdotool(&["mousedown", xdotool_button(button)]).await?;
            }
            DesktopTool::Cliclick if button == MouseButton::Left => {
                self.cliclick(&["dd:.".to_string()]).await?;
            }
            DesktopTool::Cliclick => return Err(SurfaceError::Unsupported("non-left drag")),
        }
        self.held = Some(button);
        Ok(())
    }

    async fn button_up(&mut self, button: MouseButton) -> Result<(), SurfaceError> {
        self.held = None;
        match self.tool {
            DesktopTool::Xdotool => {
                self.xdotool(&["mouseup", xdotool_button(button)]).await?;
            }
            DesktopTool::Cliclick => {
                self.cliclick(&["du:.".to_string()]).await?;
            }
        }
        Ok(())
    }

    async fn type_text(&mut self, text: &str) -> Result<(), SurfaceError> {
        match self.tool {
            DesktopTool::Xdotool => {
                self.xdotool(&["type", "--delay", TYPE_DELAY_MS, "--", text])
                    .await?;
            }
            DesktopTool::Cliclick => {
                self.cliclick(&[format!("t:{}", text)]).await?;
            }
        }
        Ok(())
    }

    async fn press_key(&mut self, key: &KeyInput) -> Result<(), SurfaceError> {
        match self.tool {
            DesktopTool::Xdotool => {
                let combo = xdotool_combo(key);
                self.xdotool(&["key", "--", &combo]).await?;
            }
            DesktopTool::Cliclick => {
                self.cliclick(&cliclick_combo(key)).await?;
            }
        }
        Ok(())
    }

    async fn scroll(&mut self, direction: ScrollDirection, amount: u32) -> Result<(), SurfaceError> {
        match self.tool {
            DesktopTool::Xdotool => {
                let button = match direction {
                    ScrollDirection::Up => "4",
                    ScrollDirection::Down => "5",
                    ScrollDirection::Left => "6",
                    ScrollDirection::Right => "7",
                };
                let repeat = amount.max(1).to_string();
                self.xdotool(&["click", "--repeat", &repeat, button]).await?;
                Ok(())
            }
            DesktopTool::Cliclick => Err(SurfaceError::Unsupported("scroll")),
        }
    }

    async fn capture(&mut self) -> Result<Vec<u8>, SurfaceError> {
        match self.tool {
            DesktopTool::Xdotool => run("import", &["-window", "root", "png:-"]).await,
            DesktopTool::Cliclick => self.capture_to_file("screencapture", &["-x"]).await,
        }
    }

    async fn capture_fallback(&mut self) -> Result<Vec<u8>, SurfaceError> {
        match self.tool {
            DesktopTool::Xdotool => self.capture_to_file("scrot", &["-o"]).await,
            DesktopTool::Cliclick => self.capture_to_file("screencapture", &["-x", "-m"]).await,
        }
    }

    async fn current_position(&mut self) -> Result<Point, SurfaceError> {
        self.pointer().await
    }

    async fn release(&mut self) -> Result<(), SurfaceError> {
        if let Some(button) = self.held {
            warn!("Releasing {:?} button still held at session end", button);
            self.button_up(button).await?;
        }
        Ok(())
    }
}
