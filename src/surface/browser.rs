use async_trait::async_trait;
use headless_chrome::browser::tab::ModifierKey;
use headless_chrome::protocol::cdp::Input;
use headless_chrome::protocol::cdp::Page::CaptureScreenshotFormatOption;
use headless_chrome::{Browser, Tab};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{InputSurface, MouseButton, OverlayMark, ScrollDirection, StructuredSurface};
use crate::error::SurfaceError;
use crate::grounding::NodeSnapshot;
use crate::keys::{DomKeys, KeyInput, KeyTable, Modifier};
use crate::scaling::Resolution;
use crate::types::Point;

/// Pixels scrolled per wheel notch.
const WHEEL_STEP: f64 = 100.0;

/// Collects interactive candidates in document order together with the
/// ancestor chain each one needs for its locator. Overlay nodes are skipped.
const QUERY_NODES_JS: &str = r#"
(() => {
  const SELECTOR = [
    'a[href]', 'button', 'input:not([type="hidden"])', 'textarea', 'select', 'summary',
    '[role="button"]', '[role="link"]', '[role="checkbox"]', '[role="radio"]', '[role="tab"]',
    '[role="menuitem"]', '[role="option"]', '[role="switch"]', '[role="textbox"]', '[role="combobox"]',
    '[onclick]', '[tabindex]:not([tabindex="-1"])', '[contenteditable="true"]'
  ].join(',');
  const nodes = [];
  const ids = new Map();

  function position(el) {
    let pos = 1;
    for (let s = el.previousElementSibling; s; s = s.previousElementSibling) {
      if (s.tagName === el.tagName) pos++;
    }
    return pos;
  }

  function intern(el) {
    if (ids.has(el)) return ids.get(el);
    const parent = el.parentElement ? intern(el.parentElement) : null;
    const idx = nodes.length;
    nodes.push({ tag: el.tagName.toLowerCase(), parent, position: position(el) });
    ids.set(el, idx);
    return idx;
  }

  const candidates = [];
  for (const el of document.querySelectorAll(SELECTOR)) {
    if (el.closest('[data-gp-overlay]')) continue;
    const idx = intern(el);
    const n = nodes[idx];
    if (el instanceof HTMLInputElement) {
      n.control = 'input'; n.value = el.value; n.placeholder = el.placeholder; n.input_type = el.type;
    } else if (el instanceof HTMLTextAreaElement) {
      n.control = 'text_area'; n.value = el.value; n.placeholder = el.placeholder;
    } else if (el instanceof HTMLSelectElement) {
      const opt = el.options[el.selectedIndex];
      n.control = 'select'; n.selected_text = opt ? opt.text : '';
    } else {
      n.text = (el.textContent || '').slice(0, 400);
    }
    const r = el.getBoundingClientRect();
    const s = getComputedStyle(el);
    const visible = r.width > 0 && r.height > 0 && s.visibility !== 'hidden' && s.display !== 'none';
    candidates.push({ node: idx, bbox: visible ? { x: r.x, y: r.y, width: r.width, height: r.height } : null });
  }
  return JSON.stringify({ nodes, candidates });
})()
"#;

const DRAW_OVERLAY_JS: &str = r#"
function(tag, marks) {
  let injected = 0;
  for (const m of marks) {
    const b = m.bbox;
    const box = document.createElement('div');
    box.setAttribute('data-gp-overlay', tag);
    box.style.cssText = 'position:fixed;pointer-events:none;box-sizing:border-box;border:2px solid red;z-index:2147483646;'
      + 'left:' + b.x + 'px;top:' + b.y + 'px;width:' + b.width + 'px;height:' + b.height + 'px;';
    const label = document.createElement('div');
    label.setAttribute('data-gp-overlay', tag);
    label.textContent = String(m.id);
    label.style.cssText = 'position:fixed;pointer-events:none;color:#fff;background:red;font:bold 12px sans-serif;padding:0 3px;z-index:2147483647;'
      + 'left:' + b.x + 'px;top:' + Math.max(0, b.y - 16) + 'px;';
    document.documentElement.appendChild(box);
    document.documentElement.appendChild(label);
    injected += 2;
  }
  return injected;
}
"#;

const REMOVE_OVERLAY_JS: &str = r#"
function(tag) {
  const found = document.querySelectorAll('[data-gp-overlay="' + CSS.escape(tag) + '"]');
  found.forEach(n => n.remove());
  return found.length;
}
"#;

const SELECT_OPTION_JS: &str = r#"
function(label) {
  const opt = Array.from(this.options || []).find(o => o.text.trim() === label || o.value === label);
  if (!opt) return false;
  this.value = opt.value;
  this.dispatchEvent(new Event('input', { bubbles: true }));
  this.dispatchEvent(new Event('change', { bubbles: true }));
  return true;
}
"#;

/// A Chrome tab driven over the DevTools protocol.
///
/// headless_chrome is blocking, so every call runs on the blocking pool with
/// a clone of the tab handle.
pub struct BrowserSurface {
    browser: Option<Browser>,
    tab: Arc<Tab>,
    pointer: Point,
    held: Option<MouseButton>,
}

impl BrowserSurface {
    pub fn new(browser: Browser, tab: Arc<Tab>) -> Self {
        Self {
            browser: Some(browser),
            tab,
            pointer: Point::default(),
            held: None,
        }
    }

    async fn blocking<T, F>(&self, op: &'static str, f: F) -> Result<T, SurfaceError>
    where
        T: Send + 'static,
        F: FnOnce(&Tab) -> anyhow::Result<T> + Send + 'static,
    {
        let tab = self.tab.clone();
        tokio::task::spawn_blocking(move || f(tab.as_ref()))
            .await
            .map_err(|e| SurfaceError::Unavailable(format!("{} task aborted: {}", op, e)))?
            .map_err(|e| classify(op, e))
    }

    async fn mouse(
        &self,
        kind: Input::DispatchMouseEventTypeOption,
        at: Point,
        button: Option<MouseButton>,
        click_count: Option<u32>,
    ) -> Result<(), SurfaceError> {
        let held = self.held.map(button_mask);
        self.blocking("mouse event", move |tab| {
            dispatch_mouse(tab, kind, at, button, held, click_count, None)
        })
        .await
    }

    async fn eval_fn(&self, op: &'static str, function: &'static str, args: Vec<serde_json::Value>) -> Result<serde_json::Value, SurfaceError> {
        let call = format!(
            "({})({})",
            function,
            args.iter().map(|a| a.to_string()).collect::<Vec<_>>().join(", ")
        );
        self.blocking(op, move |tab| {
            let result = tab.evaluate(&call, false)?;
            Ok(result.value.unwrap_or(serde_json::Value::Null))
        })
        .await
    }
}

/// A closed DevTools connection means the browser is gone; anything else is
/// a failure of the single primitive.
fn classify(op: &'static str, err: anyhow::Error) -> SurfaceError {
    let message = format!("{:#}", err);
    let lower = message.to_lowercase();
    if lower.contains("connection is closed") || lower.contains("channel closed") || lower.contains("disconnected") {
        SurfaceError::Unavailable(message)
    } else {
        SurfaceError::Primitive { op, message }
    }
}

fn cdp_button(button: MouseButton) -> Input::MouseButton {
    match button {
        MouseButton::Left => Input::MouseButton::Left,
        MouseButton::Right => Input::MouseButton::Right,
        MouseButton::Middle => Input::MouseButton::Middle,
    }
}

fn button_mask(button: MouseButton) -> u32 {
    match button {
        MouseButton::Left => 1,
        MouseButton::Right => 2,
        MouseButton::Middle => 4,
    }
}

fn cdp_modifier(modifier: Modifier) -> ModifierKey {
    match modifier {
        Modifier::Ctrl => ModifierKey::Ctrl,
        Modifier::Shift => ModifierKey::Shift,
        Modifier::Alt => ModifierKey::Alt,
        Modifier::Meta => ModifierKey::Meta,
    }
}

fn dispatch_mouse(
    tab: &Tab,
    kind: Input::DispatchMouseEventTypeOption,
    at: Point,
    button: Option<MouseButton>,
    buttons: Option<u32>,
    click_count: Option<u32>,
    delta: Option<(f64, f64)>,
) -> anyhow::Result<()> {
    tab.call_method(Input::DispatchMouseEvent {
        Type: kind,
        x: at.x as f64,
        y: at.y as f64,
        modifiers: None,
        timestamp: None,
        button: button.map(cdp_button),
        buttons,
        click_count,
        force: None,
        tangential_pressure: None,
        tilt_x: None,
        tilt_y: None,
        twist: None,
        delta_x: delta.map(|d| d.0),
        delta_y: delta.map(|d| d.1),
        pointer_Type: None,
    })?;
    Ok(())
}

fn click_at(tab: &Tab, at: Point, button: MouseButton, count: u32) -> anyhow::Result<()> {
    dispatch_mouse(tab, Input::DispatchMouseEventTypeOption::MouseMoved, at, None, None, None, None)?;
    for n in 1..=count.max(1) {
        dispatch_mouse(tab, Input::DispatchMouseEventTypeOption::MousePressed, at, Some(button), None, Some(n), None)?;
        dispatch_mouse(tab, Input::DispatchMouseEventTypeOption::MouseReleased, at, Some(button), None, Some(n), None)?;
    }
    Ok(())
}

fn element_midpoint(tab: &Tab, locator: &str) -> anyhow::Result<Point> {
    let element = tab.find_element_by_xpath(locator)?;
    element.scroll_into_view()?;
    let mid = element.get_midpoint()?;
    Ok(Point::new(mid.x.round() as i64, mid.y.round() as i64))
}

#[async_trait]
impl InputSurface for BrowserSurface {
    fn name(&self) -> &'static str {
        "browser"
    }

    async fn physical_size(&mut self) -> Result<Resolution, SurfaceError> {
        let raw = self
            .blocking("read viewport size", |tab| {
                let result = tab.evaluate("`${window.innerWidth}x${window.innerHeight}`", false)?;
                Ok(result
                    .value
                    .and_then(|v| v.as_str().map(String::from))
                    .unwrap_or_default())
            })
            .await
            .map_err(|e| SurfaceError::Unavailable(e.to_string()))?;

        raw.split_once('x')
            .and_then(|(w, h)| Some(Resolution::new(w.parse().ok()?, h.parse().ok()?)))
            .filter(|r| r.width > 0 && r.height > 0)
            .ok_or_else(|| SurfaceError::Unavailable(format!("unexpected viewport size '{}'", raw)))
    }

    async fn move_to(&mut self, to: Point) -> Result<(), SurfaceError> {
        self.mouse(Input::DispatchMouseEventTypeOption::MouseMoved, to, None, None)
            .await?;
        self.pointer = to;
        Ok(())
    }

    async fn click(&mut self, button: MouseButton, count: u32) -> Result<(), SurfaceError> {
        let at = self.pointer;
        self.blocking("click", move |tab| click_at(tab, at, button, count))
            .await
    }

    async fn button_down(&mut self, button: MouseButton) -> Result<(), SurfaceError> {
        self.mouse(Input::DispatchMouseEventTypeOption::MousePressed, self.pointer, Some(button), Some(1))
            .await?;
        self.held = Some(button);
        Ok(())
    }

    async fn button_up(&mut self, button: MouseButton) -> Result<(), SurfaceError> {
        self.held = None;
        self.mouse(Input::DispatchMouseEventTypeOption::MouseReleased, self.pointer, Some(button), Some(1))
            .await
    }

    async fn type_text(&mut self, text: &str) -> Result<(), SurfaceError> {
        let text = text.to_string();
        self.blocking("type", move |tab| {
            tab.type_str(&text)?;
            Ok(())
        })
        .await
    }

    async fn press_key(&mut self, key: &KeyInput) -> Result<(), SurfaceError> {
        let (name, modifiers) = match key {
            KeyInput::Combo(combo) => (
                DomKeys.key(combo.key),
                combo.modifiers.iter().map(|m| cdp_modifier(*m)).collect::<Vec<_>>(),
            ),
            KeyInput::Raw(raw) => (raw.clone(), Vec::new()),
        };
        debug!("Pressing key '{}' with {} modifiers", name, modifiers.len());
        self.blocking("press key", move |tab| {
            if modifiers.is_empty() {
                tab.press_key(&name)?;
            } else {
                tab.press_key_with_modifiers(&name, Some(&modifiers))?;
            }
            Ok(())
        })
        .await
    }

    async fn scroll(&mut self, direction: ScrollDirection, amount: u32) -> Result<(), SurfaceError> {
        let steps = amount.max(1) as f64 * WHEEL_STEP;
        let delta = match direction {
            ScrollDirection::Up => (0.0, -steps),
            ScrollDirection::Down => (0.0, steps),
            ScrollDirection::Left => (-steps, 0.0),
            ScrollDirection::Right => (steps, 0.0),
        };
        let at = self.pointer;
        self.blocking("scroll", move |tab| {
            dispatch_mouse(tab, Input::DispatchMouseEventTypeOption::MouseWheel, at, None, None, None, Some(delta))
        })
        .await
    }

    async fn capture(&mut self) -> Result<Vec<u8>, SurfaceError> {
        self.blocking("capture", |tab| {
            tab.capture_screenshot(CaptureScreenshotFormatOption::Png, None, None, true)
        })
        .await
    }

    /// Captures from the view instead of the compositor surface.
    async fn capture_fallback(&mut self) -> Result<Vec<u8>, SurfaceError> {
        self.blocking("capture fallback", |tab| {
            tab.capture_screenshot(CaptureScreenshotFormatOption::Png, None, None, false)
        })
        .await
    }

    async fn current_position(&mut self) -> Result<Point, SurfaceError> {
        // DevTools cannot report the mouse position; the last dispatched one is authoritative.
        Ok(self.pointer)
    }

    async fn release(&mut self) -> Result<(), SurfaceError> {
        let closed = self
            .blocking("close tab", |tab| {
                tab.close(true)?;
                Ok(())
            })
            .await;
        if let Err(e) = &closed {
            warn!("Failed to close tab cleanly: {}", e);
        }
        if self.browser.take().is_some() {
            info!("Browser released");
        }
        Ok(())
    }

    fn as_structured(&mut self) -> Option<&mut dyn StructuredSurface> {
        Some(self)
    }
}

#[async_trait]
impl StructuredSurface for BrowserSurface {
    async fn query_interactive_nodes(&mut self) -> Result<NodeSnapshot, SurfaceError> {
        let raw = self
            .blocking("query nodes", |tab| {
                let result = tab.evaluate(QUERY_NODES_JS, false)?;
                Ok(result
                    .value
                    .and_then(|v| v.as_str().map(String::from))
                    .unwrap_or_default())
            })
            .await?;
        serde_json::from_str(&raw).map_err(|e| SurfaceError::primitive("query nodes", e))
    }

    async fn draw_overlay(&mut self, tag: &str, marks: &[OverlayMark]) -> Result<usize, SurfaceError> {
        let marks = serde_json::to_value(marks).map_err(|e| SurfaceError::primitive("draw overlay", e))?;
        let injected = self
            .eval_fn("draw overlay", DRAW_OVERLAY_JS, vec![json!(tag), marks])
            .await?;
        Ok(injected.as_u64().unwrap_or(0) as usize)
    }

    async fn remove_overlay(&mut self, tag: &str) -> Result<usize, SurfaceError> {
        let removed = self
            .eval_fn("remove overlay", REMOVE_OVERLAY_JS, vec![json!(tag)])
            .await?;
        Ok(removed.as_u64().unwrap_or(0) as usize)
    }

    async fn navigate(&mut self, url: &str) -> Result<(), SurfaceError> {
        let url = url.to_string();
        info!("Navigating to {}", url);
        self.blocking("navigate", move |tab| {
            tab.navigate_to(&url)?;
            tab.wait_until_navigated()?;
            Ok(())
        })
        .await
    }

    async fn click_element(
        &mut self,
        locator: &str,
        button: MouseButton,
        count: u32,
    ) -> Result<Point, SurfaceError> {
        let locator = locator.to_string();
        let at = self
            .blocking("click element", move |tab| {
                let at = element_midpoint(tab, &locator)?;
                click_at(tab, at, button, count)?;
                Ok(at)
            })
            .await?;
        self.pointer = at;
        Ok(at)
    }

    async fn hover_element(&mut self, locator: &str) -> Result<Point, SurfaceError> {
        let locator = locator.to_string();
        let at = self
            .blocking("hover element", move |tab| {
                let at = element_midpoint(tab, &locator)?;
                dispatch_mouse(tab, Input::DispatchMouseEventTypeOption::MouseMoved, at, None, None, None, None)?;
                Ok(at)
            })
            .await?;
        self.pointer = at;
        Ok(at)
    }

    async fn focus_element(&mut self, locator: &str) -> Result<(), SurfaceError> {
        let locator = locator.to_string();
        self.blocking("focus element", move |tab| {
            tab.find_element_by_xpath(&locator)?.focus()?;
            Ok(())
        })
        .await
    }

    async fn select_option(&mut self, locator: &str, label: &str) -> Result<(), SurfaceError> {
        let locator = locator.to_string();
        let label = label.to_string();
        self.blocking("select option", move |tab| {
            let element = tab.find_element_by_xpath(&locator)?;
            let result = element.call_js_fn(SELECT_OPTION_JS, vec![json!(label)], false)?;
            match result.value.and_then(|v| v.as_bool()) {
                Some(true) => Ok(()),
                _ => anyhow::bail!("no option labelled '{}'", label),
            }
        })
        .await
    }

    async fn scroll_into_view(&mut self, locator: &str) -> Result<(), SurfaceError> {
        let locator = locator.to_string();
        self.blocking("scroll into view", move |tab| {
            tab.find_element_by_xpath(&locator)?.scroll_into_view()?;
            Ok(())
        })
        .await
    }

    async fn wait_for_element(&mut self, locator: &str, timeout: Duration) -> Result<(), SurfaceError> {
        let locator = locator.to_string();
        self.blocking("wait for element", move |tab| {
            tab.wait_for_xpath_with_custom_timeout(&locator, timeout)?;
            Ok(())
        })
        .await
    }
}
