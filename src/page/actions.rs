//! Execution of observed actions through xpath-targeted scripts.

use std::collections::HashMap;

use crate::engine::{EngineError, ObserveResult};

use super::StagehandPage;

/// Actions the page knows how to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PageAction {
    Click,
    Fill,
    Press,
    SelectOption,
    ScrollIntoView,
    ScrollTo,
    NextChunk,
    PrevChunk,
}

impl PageAction {
    pub(crate) fn parse(method: &str) -> Option<Self> {
        match method.trim().to_ascii_lowercase().as_str() {
            "click" => Some(PageAction::Click),
            "fill" | "type" => Some(PageAction::Fill),
            "press" => Some(PageAction::Press),
            "selectoptionfromdropdown" => Some(PageAction::SelectOption),
            "scrollintoview" => Some(PageAction::ScrollIntoView),
            "scroll" | "scrollto" | "mouse.wheel" => Some(PageAction::ScrollTo),
            "nextchunk" => Some(PageAction::NextChunk),
            "prevchunk" => Some(PageAction::PrevChunk),
            _ => None,
        }
    }
}

/// Replace `%name%` tokens in each argument with the variable's value.
pub(crate) fn substitute_variables(
    args: &[String],
    variables: &HashMap<String, String>,
) -> Vec<String> {
    args.iter()
        .map(|arg| {
            variables.iter().fold(arg.clone(), |current, (key, value)| {
                current.replace(&format!("%{key}%"), value)
            })
        })
        .collect()
}

pub(crate) fn ensure_xpath(selector: &str) -> Result<&str, EngineError> {
    selector
        .strip_prefix("xpath=")
        .ok_or_else(|| EngineError::Unsupported(format!("selector is not an xpath: {selector}")))
}

/// Wrap `body` in a script that binds `el` to the node at `xpath`.
pub(crate) fn build_xpath_script(xpath: &str, body: &str) -> Result<String, EngineError> {
    let xpath_json = serde_json::to_string(xpath)?;
    Ok(format!(
        "(function() {{
            const result = document.evaluate({xpath_json}, document, null, XPathResult.FIRST_ORDERED_NODE_TYPE, null);
            const el = result.singleNodeValue;
            if (!el) {{
                throw new Error('Element not found for xpath');
            }}
            {body}
        }})()"
    ))
}

/// Script body performing `action` on `el` with the given first argument.
pub(crate) fn action_body(action: PageAction, argument: &str) -> Result<String, EngineError> {
    let arg = serde_json::to_string(argument)?;
    let body = match action {
        PageAction::Click => "el.click(); return true;".to_string(),
        PageAction::ScrollIntoView => {
            "el.scrollIntoView({ behavior: 'smooth', block: 'center', inline: 'center' }); return true;"
                .to_string()
        }
        PageAction::Fill => format!(
            "const value = {arg};
            el.focus();
            if ('value' in el) {{
                el.value = value;
            }}
            el.dispatchEvent(new Event('input', {{ bubbles: true }}));
            el.dispatchEvent(new Event('change', {{ bubbles: true }}));
            return true;"
        ),
        PageAction::Press => format!(
            "const keyValue = {arg};
            el.focus();
            const eventInit = {{ key: keyValue, bubbles: true, cancelable: true }};
            el.dispatchEvent(new KeyboardEvent('keydown', eventInit));
            el.dispatchEvent(new KeyboardEvent('keyup', eventInit));
            if (keyValue === 'Enter' && el.form) {{
                el.form.requestSubmit ? el.form.requestSubmit() : el.form.submit();
            }}
            return true;"
        ),
        PageAction::SelectOption => format!(
            "const desired = {arg};
            if (el.tagName.toLowerCase() !== 'select') {{
                throw new Error('Target is not a <select> element');
            }}
            const match = Array.from(el.options).find(opt => opt.value === desired || opt.text === desired);
            if (!match) {{
                throw new Error('No matching option for value');
            }}
            el.value = match.value;
            el.dispatchEvent(new Event('input', {{ bubbles: true }}));
            el.dispatchEvent(new Event('change', {{ bubbles: true }}));
            return true;"
        ),
        PageAction::ScrollTo => format!(
            "const raw = String({arg}).trim().replace('%', '');
            const parsed = parseFloat(raw);
            const yPct = Number.isNaN(parsed) ? 0 : Math.max(0, Math.min(parsed, 100));
            const tag = el.tagName.toLowerCase();
            if (tag === 'html' || tag === 'body') {{
                const scrollHeight = Math.max(document.body.scrollHeight - window.innerHeight, 0);
                window.scrollTo({{ top: scrollHeight * (yPct / 100), left: window.scrollX, behavior: 'smooth' }});
            }} else {{
                const scrollHeight = Math.max(el.scrollHeight - el.clientHeight, 0);
                el.scrollTo({{ top: scrollHeight * (yPct / 100), left: el.scrollLeft, behavior: 'smooth' }});
            }}
            return true;"
        ),
        PageAction::NextChunk | PageAction::PrevChunk => {
            let direction = if action == PageAction::NextChunk { 1 } else { -1 };
            format!(
                "const tag = el.tagName.toLowerCase();
                const page = tag === 'html' || tag === 'body';
                const delta = (page ? window.innerHeight : el.clientHeight) * {direction};
                (page ? window : el).scrollBy({{ top: delta, left: 0, behavior: 'smooth' }});
                return true;"
            )
        }
    };
    Ok(body)
}

/// Run the observed action against the page.
pub(crate) async fn perform(page: &StagehandPage, target: &ObserveResult) -> Result<(), EngineError> {
    let method = target.method.as_deref().unwrap_or("click");
    let action = PageAction::parse(method)
        .ok_or_else(|| EngineError::Unsupported(format!("action method {method}")))?;
    let argument = target
        .arguments
        .as_ref()
        .and_then(|args| args.first())
        .map(String::as_str)
        .unwrap_or_default();

    let xpath = ensure_xpath(&target.selector)?;
    let script = build_xpath_script(xpath, &action_body(action, argument)?)?;

    match page.evaluate_expression(&script).await {
        Ok(_) => {
            page.logger()
                .debug(format!("Executed {method} on {}", target.selector), Some("act"), None);
            Ok(())
        }
        Err(err) => {
            page.logger()
                .error(format!("Failed to execute {method}: {err}"), Some("act"), None);
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitute_variables_replaces_tokens() {
        let args = vec![
            "click on %TARGET% now".to_string(),
            "value=%VALUE%".to_string(),
        ];
        let vars = HashMap::from([
            ("TARGET".to_string(), "button".to_string()),
            ("VALUE".to_string(), "42".to_string()),
        ]);

        assert_eq!(
            substitute_variables(&args, &vars),
            vec!["click on button now".to_string(), "value=42".to_string()]
        );
    }

    #[test]
    fn methods_parse_case_insensitively() {
        assert_eq!(PageAction::parse("Click"), Some(PageAction::Click));
        assert_eq!(PageAction::parse("type"), Some(PageAction::Fill));
        assert_eq!(
            PageAction::parse("selectOptionFromDropdown"),
            Some(PageAction::SelectOption)
        );
        assert_eq!(PageAction::parse("hover"), None);
    }

    #[test]
    fn xpath_selectors_are_required() {
        assert_eq!(ensure_xpath("xpath=/html[1]/body[1]").unwrap(), "/html[1]/body[1]");
        assert!(matches!(
            ensure_xpath("#submit"),
            Err(EngineError::Unsupported(_))
        ));
    }

    #[test]
    fn scripts_escape_their_inputs() {
        let script = build_xpath_script("//a[@title=\"x\"]", "return true;").unwrap();
        assert!(script.contains(r#"document.evaluate("//a[@title=\"x\"]""#));

        let body = action_body(PageAction::Fill, "it's \"quoted\"").unwrap();
        assert!(body.contains(r#"const value = "it's \"quoted\"";"#));
    }
}
