//! Selector hint compilation.
//!
//! A [`SelectorHint`] compiles to a [`Locator`] without touching the page;
//! the driver resolves locators by running a finder script that tags the
//! match with a marker attribute and then addresses it by CSS. There is no
//! fallback between strategies.

use crate::browser::DriverError;
use crate::schema::{SelectorHint, SelectorStrategy};

/// Attribute the finder script sets on the matched element.
pub const MARK_ATTR: &str = "data-pqa-target";
/// CSS selector addressing the marked element.
pub const MARK_SELECTOR: &str = "[data-pqa-target=\"1\"]";

/// Compiled element locator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    Css(String),
    Text(String),
    Role { role: String, name: Option<String> },
}

impl std::fmt::Display for Locator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Locator::Css(css) => write!(f, "css={css}"),
            Locator::Text(text) => write!(f, "text={text}"),
            Locator::Role { role, name: None } => write!(f, "role={role}"),
            Locator::Role {
                role,
                name: Some(name),
            } => write!(f, "role={role}[name={name}]"),
        }
    }
}

/// Compile a hint into a locator. Fails synchronously when a `role`
/// strategy arrives without a role, carrying the strategy and hint.
pub fn compile(hint: &SelectorHint) -> Result<Locator, DriverError> {
    match hint.strategy {
        SelectorStrategy::Testid => Ok(Locator::Css(format!(
            "[data-testid={}]",
            css_string(&hint.value)
        ))),
        SelectorStrategy::Role => {
            let role = hint.role.clone().ok_or_else(|| {
                DriverError::BadSelector(format!(
                    "strategy 'role' requires a role (hint value: '{}')",
                    hint.value
                ))
            })?;
            Ok(Locator::Role {
                role,
                name: hint.name.clone(),
            })
        }
        SelectorStrategy::Text => Ok(Locator::Text(hint.value.clone())),
        SelectorStrategy::Css => Ok(Locator::Css(hint.value.clone())),
    }
}

/// JS expression that tags the locator's match with [`MARK_ATTR`] and
/// reports whether one was found (and visible, when required).
pub fn finder_script(locator: &Locator, require_visible: bool) -> String {
    let finder = match locator {
        Locator::Css(css) => format!("document.querySelector({})", js_string(css)),
        Locator::Text(text) => format!(
            "Array.from(document.querySelectorAll(\
             'a, button, [role], input, select, textarea, label, summary, option, \
             span, div, li, td, th, h1, h2, h3, h4, h5, h6, p'))\
             .find((el) => ((el.innerText || el.textContent || '').trim() === {}))",
            js_string(text)
        ),
        Locator::Role { role, name } => {
            let name_filter = match name {
                Some(name) => format!(" && accName(el) === {}", js_string(name)),
                None => String::new(),
            };
            format!(
                "(() => {{\
                 const implicit = {{ a: 'link', button: 'button', select: 'combobox', \
                 textarea: 'textbox', summary: 'button', option: 'option' }};\
                 const inputRoles = {{ button: 'button', submit: 'button', reset: 'button', \
                 checkbox: 'checkbox', radio: 'radio', range: 'slider' }};\
                 const roleOf = (el) => {{\
                   const explicit = el.getAttribute('role');\
                   if (explicit) return explicit;\
                   const tag = el.tagName.toLowerCase();\
                   if (tag === 'input') return inputRoles[el.type] || 'textbox';\
                   if (/^h[1-6]$/.test(tag)) return 'heading';\
                   if (tag === 'a' && !el.hasAttribute('href')) return '';\
                   return implicit[tag] || '';\
                 }};\
                 const accName = (el) => (el.getAttribute('aria-label') || \
                   (el.innerText || el.value || '').trim());\
                 return Array.from(document.querySelectorAll('*'))\
                   .find((el) => roleOf(el) === {}{});\
                 }})()",
                js_string(role),
                name_filter
            )
        }
    };

    let visible_check = if require_visible {
        "const rect = target.getBoundingClientRect();\
         if (rect.width === 0 || rect.height === 0) return false;"
    } else {
        ""
    };

    format!(
        "(() => {{\
         for (const el of document.querySelectorAll('[{mark}]')) \
           el.removeAttribute('{mark}');\
         const target = {finder};\
         if (!target) return false;\
         {visible_check}\
         target.setAttribute('{mark}', '1');\
         return true;\
         }})()",
        mark = MARK_ATTR,
        finder = finder,
        visible_check = visible_check,
    )
}

/// Escape a Rust string into a JS string literal.
fn js_string(value: &str) -> String {
    serde_json::to_string(value).expect("strings always serialize")
}

fn css_string(value: &str) -> String {
    js_string(value)
}
