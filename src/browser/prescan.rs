//! Page snapshot extraction.
//!
//! `prescan` navigates first; `prescan_current` reads the page as-is (the
//! agent loop observes after every act). Title, visible text, meta
//! description and the element inventory are read concurrently.

use std::time::Duration;

use serde_json::Value;

use crate::browser::{Driver, DriverError};
use crate::config::{MAX_ELEMENTS, PRESCAN_TEXT_CHARS};
use crate::schema::{InteractiveElement, PageSnapshot};

/// In-page routine enumerating interactive elements. Deduplicates by DOM
/// node; input labels come from aria-label, `<label for>`, or an enclosing
/// label.
const EXTRACT_ELEMENTS_JS: &str = r#"
(() => {
  const seen = new Set();
  const out = [];
  const labelFor = (el) => {
    const aria = el.getAttribute('aria-label');
    if (aria) return aria;
    if (el.id) {
      const label = document.querySelector(`label[for="${el.id}"]`);
      if (label) return label.innerText.trim();
    }
    const enclosing = el.closest('label');
    if (enclosing) return enclosing.innerText.trim();
    return null;
  };
  const push = (el) => {
    if (seen.has(el)) return;
    seen.add(el);
    const tag = el.tagName.toLowerCase();
    const entry = { tag };
    const text = (el.innerText || '').trim();
    if (text) entry.text = text.slice(0, 80);
    if (el.type) entry.type = el.type;
    if (el.dataset && el.dataset.testid) entry.testId = el.dataset.testid;
    if (el.name) entry.name = el.name;
    if (el.placeholder) entry.placeholder = el.placeholder;
    if (tag === 'a' && el.getAttribute('href')) entry.href = el.getAttribute('href');
    if (tag === 'input' || tag === 'textarea' || tag === 'select') {
      const label = labelFor(el);
      if (label && !entry.text) entry.text = label.slice(0, 80);
    }
    if (tag === 'select') {
      entry.options = Array.from(el.options).map((o) => o.label || o.value).slice(0, 20);
    }
    if (el.disabled) entry.disabled = true;
    if (el.readOnly) entry.readOnly = true;
    if (el.classList && el.classList.length) entry.classList = Array.from(el.classList).slice(0, 8);
    if (el.getAttribute('aria-busy') === 'true') entry.ariaBusy = true;
    out.push(entry);
  };
  for (const el of document.querySelectorAll('button, [role=button]')) push(el);
  for (const el of document.querySelectorAll('a[href]')) push(el);
  for (const el of document.querySelectorAll('input, select, textarea')) push(el);
  return out;
})()
"#;

/// Navigate to `url` (domcontentloaded semantics), then snapshot.
pub async fn prescan(
    driver: &dyn Driver,
    url: &str,
    navigation_timeout: Duration,
) -> Result<PageSnapshot, DriverError> {
    driver.goto(url, navigation_timeout).await?;
    prescan_current(driver).await
}

/// Snapshot the current page without navigating.
pub async fn prescan_current(driver: &dyn Driver) -> Result<PageSnapshot, DriverError> {
    let (url, title, body_text, elements_raw, meta) = tokio::try_join!(
        driver.current_url(),
        driver.title(),
        driver.inner_text("body"),
        driver.evaluate(EXTRACT_ELEMENTS_JS),
        driver.evaluate(
            "(() => { const m = document.querySelector('meta[name=\"description\"]'); \
             return m ? m.content : ''; })()"
        ),
    )?;

    let mut elements = parse_elements(elements_raw);
    elements.truncate(MAX_ELEMENTS);

    let meta_description = meta
        .as_str()
        .map(str::trim)
        .filter(|description| !description.is_empty())
        .map(str::to_string);

    Ok(PageSnapshot {
        url,
        title,
        visible_text: truncate_chars(&body_text, PRESCAN_TEXT_CHARS),
        elements,
        meta_description,
    })
}

fn parse_elements(raw: Value) -> Vec<InteractiveElement> {
    match raw {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|item| serde_json::from_value(item).ok())
            .collect(),
        _ => Vec::new(),
    }
}

pub(crate) fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        text.chars().take(max).collect()
    }
}
