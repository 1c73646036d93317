//! Hidden WebForms state fields.
//!
//! Every page served by the portal carries three hidden inputs that have to
//! be echoed back, untouched, in the next postback to that page.

use std::sync::LazyLock;

use scraper::{Html, Selector};

pub const VIEW_STATE_ID: &str = "__VIEWSTATE";
pub const VIEW_STATE_GENERATOR_ID: &str = "__VIEWSTATEGENERATOR";
pub const EVENT_VALIDATION_ID: &str = "__EVENTVALIDATION";

static VIEW_STATE_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("#__VIEWSTATE").unwrap());
static VIEW_STATE_GENERATOR_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("#__VIEWSTATEGENERATOR").unwrap());
static EVENT_VALIDATION_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("#__EVENTVALIDATION").unwrap());

/// Tokens harvested from one page load. Valid for exactly one postback, so
/// the value is consumed when turned into form fields.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FormTokens {
    pub view_state: String,
    pub view_state_generator: String,
    pub event_validation: String,
}

impl FormTokens {
    pub fn is_complete(&self) -> bool {
        !self.view_state.is_empty()
            && !self.view_state_generator.is_empty()
            && !self.event_validation.is_empty()
    }

    /// Names of the tokens the page did not carry.
    pub fn missing(&self) -> Vec<&'static str> {
        [
            (VIEW_STATE_ID, &self.view_state),
            (VIEW_STATE_GENERATOR_ID, &self.view_state_generator),
            (EVENT_VALIDATION_ID, &self.event_validation),
        ]
        .into_iter()
        .filter(|(_, value)| value.is_empty())
        .map(|(id, _)| id)
        .collect()
    }

    pub fn into_form_fields(self) -> Vec<(String, String)> {
        vec![
            (VIEW_STATE_ID.to_string(), self.view_state),
            (VIEW_STATE_GENERATOR_ID.to_string(), self.view_state_generator),
            (EVENT_VALIDATION_ID.to_string(), self.event_validation),
        ]
    }
}

/// Reads the three hidden fields out of `html`. A missing element yields an
/// empty string for that field.
pub fn extract_form_tokens(html: &str) -> FormTokens {
    let document = Html::parse_document(html);
    let value_of = |selector: &Selector| {
        document
            .select(selector)
            .next()
            .and_then(|el| el.value().attr("value"))
            .unwrap_or_default()
            .to_string()
    };

    FormTokens {
        view_state: value_of(&VIEW_STATE_SELECTOR),
        view_state_generator: value_of(&VIEW_STATE_GENERATOR_SELECTOR),
        event_validation: value_of(&EVENT_VALIDATION_SELECTOR),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL_PAGE: &str = r#"<html><body><form method="post" action="./SBLogin.aspx">
        <input type="hidden" name="__VIEWSTATE" id="__VIEWSTATE" value="dDwtMTA4MzE0MjEwNTs7Pg==" />
        <input type="hidden" name="__VIEWSTATEGENERATOR" id="__VIEWSTATEGENERATOR" value="C2EE9ABB" />
        <input type="hidden" name="__EVENTVALIDATION" id="__EVENTVALIDATION" value="/wEdAAR+" />
        </form></body></html>"#;

    #[test]
    fn extracts_all_three_tokens() {
        let tokens = extract_form_tokens(FULL_PAGE);
        assert_eq!(tokens.view_state, "dDwtMTA4MzE0MjEwNTs7Pg==");
        assert_eq!(tokens.view_state_generator, "C2EE9ABB");
        assert_eq!(tokens.event_validation, "/wEdAAR+");
        assert!(tokens.is_complete());
        assert!(tokens.missing().is_empty());
    }

    #[test]
    fn missing_fields_become_empty_strings() {
        let html = r#"<form>
            <input type="hidden" id="__VIEWSTATE" value="abc" />
            </form>"#;
        let tokens = extract_form_tokens(html);
        assert_eq!(tokens.view_state, "abc");
        assert_eq!(tokens.view_state_generator, "");
        assert_eq!(tokens.event_validation, "");
        assert!(!tokens.is_complete());
        assert_eq!(
            tokens.missing(),
            vec![VIEW_STATE_GENERATOR_ID, EVENT_VALIDATION_ID]
        );
    }

    #[test]
    fn element_without_value_attribute_is_empty() {
        let html = r#"<input id="__VIEWSTATE" /><input id="__VIEWSTATEGENERATOR" value="G" />"#;
        let tokens = extract_form_tokens(html);
        assert_eq!(tokens.view_state, "");
        assert_eq!(tokens.view_state_generator, "G");
    }

    #[test]
    fn garbage_input_never_panics() {
        let tokens = extract_form_tokens("<<<not html at all");
        assert_eq!(tokens, FormTokens::default());
        assert_eq!(extract_form_tokens(""), FormTokens::default());
    }

    #[test]
    fn form_fields_keep_token_values_verbatim() {
        let fields = extract_form_tokens(FULL_PAGE).into_form_fields();
        assert_eq!(
            fields,
            vec![
                ("__VIEWSTATE".to_string(), "dDwtMTA4MzE0MjEwNTs7Pg==".to_string()),
                ("__VIEWSTATEGENERATOR".to_string(), "C2EE9ABB".to_string()),
                ("__EVENTVALIDATION".to_string(), "/wEdAAR+".to_string()),
            ]
        );
    }
}
