//! Page-context scripts and the snapshot they produce.
//!
//! The snapshot lists the visible interactive elements of the page with a
//! numeric id and an absolute xpath, plus the page's text. Observe and act hand
//! the element list to the model and map the ids it returns back to xpaths.

use serde::{Deserialize, Serialize};

/// Maximum characters of page text kept in a snapshot.
pub const MAX_PAGE_TEXT_CHARS: usize = 20_000;

/// Collects interactive elements and page text. Evaluates to a JSON object.
pub const SNAPSHOT_SCRIPT: &str = r#"
(() => {
    const selector = [
        'a', 'button', 'input', 'select', 'textarea', 'summary',
        '[role="button"]', '[role="link"]', '[role="checkbox"]',
        '[role="radio"]', '[role="textbox"]', '[role="combobox"]',
        '[role="listbox"]', '[role="menuitem"]', '[role="option"]',
        '[role="tab"]', '[role="switch"]', '[onclick]', '[tabindex]',
        'iframe'
    ].join(', ');

    function isVisible(el) {
        const rect = el.getBoundingClientRect();
        const style = getComputedStyle(el);
        return rect.width > 0 && rect.height > 0 &&
            style.visibility !== 'hidden' && style.display !== 'none';
    }

    function xpathOf(el) {
        const parts = [];
        for (let node = el; node && node.nodeType === Node.ELEMENT_NODE; node = node.parentNode) {
            let index = 1;
            for (let sib = node.previousElementSibling; sib; sib = sib.previousElementSibling) {
                if (sib.nodeName === node.nodeName) index++;
            }
            parts.unshift(node.nodeName.toLowerCase() + '[' + index + ']');
        }
        return '/' + parts.join('/');
    }

    function roleOf(el) {
        const explicit = el.getAttribute('role');
        if (explicit) return explicit;
        const tag = el.tagName.toLowerCase();
        if (tag === 'a') return 'link';
        if (tag === 'button' || tag === 'summary') return 'button';
        if (tag === 'select') return 'combobox';
        if (tag === 'textarea') return 'textbox';
        if (tag === 'iframe') return 'iframe';
        if (tag === 'input') {
            if (el.type === 'checkbox' || el.type === 'radio') return el.type;
            if (el.type === 'submit' || el.type === 'button') return 'button';
            return 'textbox';
        }
        return 'generic';
    }

    function labelOf(el) {
        const text = (el.getAttribute('aria-label') || el.innerText || el.value ||
            el.placeholder || el.title || el.alt || '').trim().replace(/\s+/g, ' ');
        return text.length > 120 ? text.substring(0, 120) + '...' : text;
    }

    const elements = [];
    let id = 1;
    for (const el of document.querySelectorAll(selector)) {
        if (el.tagName.toLowerCase() === 'input' && el.type === 'hidden') continue;
        if (!isVisible(el)) continue;
        elements.push({
            id: id++,
            tag: el.tagName.toLowerCase(),
            role: roleOf(el),
            text: labelOf(el),
            xpath: xpathOf(el),
            href: el.href || null
        });
    }

    const text = (document.body ? document.body.innerText : '') || '';
    return { url: location.href, title: document.title, elements, text };
})()
"#;

/// Returns the page's visible text. Used for instruction-less extraction.
pub const PAGE_TEXT_SCRIPT: &str = "(document.body ? document.body.innerText : '') || ''";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotElement {
    pub id: i64,
    pub tag: String,
    pub role: String,
    #[serde(default)]
    pub text: String,
    pub xpath: String,
    #[serde(default)]
    pub href: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomSnapshot {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub elements: Vec<SnapshotElement>,
    #[serde(default)]
    pub text: String,
}

impl DomSnapshot {
    pub fn element(&self, id: i64) -> Option<&SnapshotElement> {
        self.elements.iter().find(|element| element.id == id)
    }

    /// One line per element: `[id] role <tag>: text`.
    pub fn element_listing(&self) -> String {
        self.elements
            .iter()
            .map(|element| {
                let mut line = format!("[{}] {} <{}>", element.id, element.role, element.tag);
                if !element.text.is_empty() {
                    line.push_str(": ");
                    line.push_str(&element.text);
                }
                line
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Page text clipped to [`MAX_PAGE_TEXT_CHARS`] on a char boundary.
    pub fn clipped_text(&self) -> &str {
        clip(&self.text, MAX_PAGE_TEXT_CHARS)
    }
}

pub fn clip(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((index, _)) => &text[..index],
        None => text,
    }
}
