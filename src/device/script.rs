//! Restricted interpreter for generated action scripts.
//!
//! A script reaches exactly two bindings: the device-control surface and a
//! delay primitive. The grammar is fixed and line-oriented; anything outside
//! it is an execution fault, captured as data and fed back into the next
//! generation attempt rather than unwinding through the dispatch loop.
//!
//! ```text
//! driver.tap(539, 1950)
//! driver.double_tap(100, 200)
//! driver.long_press(100, 200, 1500)
//! driver.swipe(540, 1600, 540, 400)
//! driver.type_text(540, 960, "hello")
//! driver.press_key("enter")
//! driver.launch("com.android.camera")
//! time.sleep(2)
//! ```
//!
//! Blank lines and `#` comments are ignored.

use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;

use crate::device::{DeviceControl, DeviceKey};
use crate::errors::{TapCrewError, TapCrewResult};

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Tap { x: i32, y: i32 },
    DoubleTap { x: i32, y: i32 },
    LongPress { x: i32, y: i32, duration_ms: u64 },
    Swipe { x1: i32, y1: i32, x2: i32, y2: i32 },
    TypeText { x: i32, y: i32, text: String },
    PressKey(DeviceKey),
    Launch(String),
    Sleep(f64),
}

#[derive(Debug, Clone, PartialEq)]
enum Arg {
    Number(f64),
    Text(String),
}

fn call_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(driver|time)\.([a-z_]+)\((.*)\)$").unwrap())
}

/// Parse a whole script into statements. The first offending line fails the
/// parse with its line number; nothing executes from a script that does not
/// parse in full.
pub fn parse_script(script: &str) -> TapCrewResult<Vec<Statement>> {
    let mut statements = Vec::new();
    for (index, raw) in script.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        statements.push(parse_line(line).map_err(|reason| {
            TapCrewError::Script(format!("line {}: {reason}: `{line}`", index + 1))
        })?);
    }
    Ok(statements)
}

fn parse_line(line: &str) -> Result<Statement, String> {
    let caps = call_re()
        .captures(line)
        .ok_or_else(|| "unsupported statement".to_string())?;
    let receiver = &caps[1];
    let method = &caps[2];
    let args = parse_args(&caps[3])?;

    match (receiver, method) {
        ("time", "sleep") => Ok(Statement::Sleep(number(&args, 0)?)),
        ("driver", "tap") => Ok(Statement::Tap {
            x: int(&args, 0)?,
            y: int(&args, 1)?,
        }),
        ("driver", "double_tap") => Ok(Statement::DoubleTap {
            x: int(&args, 0)?,
            y: int(&args, 1)?,
        }),
        ("driver", "long_press") => Ok(Statement::LongPress {
            x: int(&args, 0)?,
            y: int(&args, 1)?,
            duration_ms: int(&args, 2)?.max(0) as u64,
        }),
        ("driver", "swipe") => Ok(Statement::Swipe {
            x1: int(&args, 0)?,
            y1: int(&args, 1)?,
            x2: int(&args, 2)?,
            y2: int(&args, 3)?,
        }),
        ("driver", "type_text") => Ok(Statement::TypeText {
            x: int(&args, 0)?,
            y: int(&args, 1)?,
            text: text(&args, 2)?,
        }),
        ("driver", "press_key") => {
            let name = text(&args, 0)?;
            DeviceKey::parse(&name)
                .map(Statement::PressKey)
                .ok_or_else(|| format!("unknown key `{name}`"))
        }
        ("driver", "launch") => Ok(Statement::Launch(text(&args, 0)?)),
        _ => Err(format!("unknown operation `{receiver}.{method}`")),
    }
}

/// Split a comma-separated argument list, honoring quoted strings.
fn parse_args(raw: &str) -> Result<Vec<Arg>, String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;

    for c in raw.chars() {
        match quote {
            Some(q) if c == q => {
                quote = None;
                args.push(Arg::Text(std::mem::take(&mut current)));
            }
            Some(_) => current.push(c),
            None => match c {
                '"' | '\'' => {
                    if !current.trim().is_empty() {
                        return Err("unexpected quote".to_string());
                    }
                    current.clear();
                    quote = Some(c);
                }
                ',' => {
                    push_number(&mut args, &mut current)?;
                }
                _ => current.push(c),
            },
        }
    }
    if quote.is_some() {
        return Err("unterminated string".to_string());
    }
    push_number(&mut args, &mut current)?;
    Ok(args)
}

fn push_number(args: &mut Vec<Arg>, current: &mut String) -> Result<(), String> {
    let token = current.trim();
    if token.is_empty() {
        current.clear();
        return Ok(());
    }
    let value: f64 = token
        .parse()
        .map_err(|_| format!("malformed argument `{token}`"))?;
    args.push(Arg::Number(value));
    current.clear();
    Ok(())
}

fn number(args: &[Arg], index: usize) -> Result<f64, String> {
    match args.get(index) {
        Some(Arg::Number(n)) => Ok(*n),
        _ => Err(format!("argument {} must be a number", index + 1)),
    }
}

fn int(args: &[Arg], index: usize) -> Result<i32, String> {
    Ok(number(args, index)? as i32)
}

fn text(args: &[Arg], index: usize) -> Result<String, String> {
    match args.get(index) {
        Some(Arg::Text(s)) => Ok(s.clone()),
        _ => Err(format!("argument {} must be a string", index + 1)),
    }
}

/// Parse and run a script against the device. Returns the number of
/// statements executed; the first fault aborts the rest of the script.
pub async fn execute(script: &str, device: &dyn DeviceControl) -> TapCrewResult<usize> {
    let statements = parse_script(script)?;
    let mut executed = 0;
    for statement in &statements {
        tracing::debug!(?statement, "executing script statement");
        match statement {
            Statement::Tap { x, y } => device.tap(*x, *y).await?,
            Statement::DoubleTap { x, y } => device.double_tap(*x, *y).await?,
            Statement::LongPress { x, y, duration_ms } => {
                device.long_press(*x, *y, *duration_ms).await?
            }
            Statement::Swipe { x1, y1, x2, y2 } => device.swipe(*x1, *y1, *x2, *y2).await?,
            Statement::TypeText { x, y, text } => device.type_text(*x, *y, text).await?,
            Statement::PressKey(key) => device.press_key(*key).await?,
            Statement::Launch(package) => device.launch(package).await?,
            Statement::Sleep(secs) => {
                tokio::time::sleep(Duration::from_secs_f64(secs.max(0.0))).await
            }
        }
        executed += 1;
    }
    Ok(executed)
}
