use std::sync::LazyLock;

use log::{error, info, warn};
use scraper::{Html, Selector};

use crate::{
    form_tokens::extract_form_tokens,
    requests::SessionClient,
    shape_error::ShapeMismatchError,
    text_manipulators::extract_trimmed_text,
};

pub const LOGIN_PATH: &str = "/SBLogin.aspx";

const USERNAME_FIELD: &str = "txtUserName";
const PASSWORD_FIELD: &str = "txtPassword";
const SUBMIT_FIELD: &str = "btnSubmit";
const SUBMIT_VALUE: &str = "Login";

// Only rendered on pages served to a signed-in student.
static LOGOUT_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("#Stud_Logout").unwrap());
static MESSAGE_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("#lblMessage").unwrap());

/// A student's portal login. Supplied by the caller for one session and
/// never persisted here.
#[derive(Clone)]
pub struct Credentials {
    pub identifier: String,
    pub secret: String,
}

impl Credentials {
    pub fn new(identifier: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            secret: secret.into(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("identifier", &self.identifier)
            .field("secret", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginOutcome {
    Accepted,
    /// The portal answered but did not sign us in. Carries its message, if
    /// it showed one.
    Rejected(Option<String>),
}

/// Reads the login verdict off the page the login postback returned. The
/// HTTP status plays no part in it.
pub fn login_outcome(html: &str) -> LoginOutcome {
    let document = Html::parse_document(html);
    if document.select(&LOGOUT_SELECTOR).next().is_some() {
        return LoginOutcome::Accepted;
    }
    let message = document
        .select(&MESSAGE_SELECTOR)
        .next()
        .map(extract_trimmed_text)
        .filter(|text| !text.is_empty());
    LoginOutcome::Rejected(message)
}

async fn try_login(client: &SessionClient, credentials: &Credentials) -> anyhow::Result<bool> {
    let login_page = client.get(LOGIN_PATH).await?;
    let tokens = extract_form_tokens(&login_page.body);
    if !tokens.is_complete() {
        return Err(ShapeMismatchError::new(
            LOGIN_PATH,
            format!("missing hidden fields {:?}", tokens.missing()),
        )
        .into());
    }

    let mut form = tokens.into_form_fields();
    form.extend([
        (USERNAME_FIELD.to_string(), credentials.identifier.clone()),
        (PASSWORD_FIELD.to_string(), credentials.secret.clone()),
        (SUBMIT_FIELD.to_string(), SUBMIT_VALUE.to_string()),
    ]);

    let response = client.post_form(LOGIN_PATH, &form).await?;
    match login_outcome(&response.body) {
        LoginOutcome::Accepted => Ok(true),
        LoginOutcome::Rejected(message) => {
            warn!(
                "login rejected for {} (HTTP {}): {}",
                credentials.identifier,
                response.status,
                message.as_deref().unwrap_or("no message from portal")
            );
            Ok(false)
        }
    }
}

/// Signs `client` in. Never fails: network errors, an unrecognised login
/// page and rejected credentials all come back as `false`.
pub async fn login(client: &SessionClient, credentials: &Credentials) -> bool {
    let logged_in = match try_login(client, credentials).await {
        Ok(logged_in) => logged_in,
        Err(e) => {
            if e.downcast_ref::<ShapeMismatchError>().is_some() {
                error!("login page not recognised: {}", e);
            } else {
                error!("login failed at {}: {:#}", LOGIN_PATH, e);
            }
            false
        }
    };

    client.set_authenticated(logged_in);
    if logged_in {
        info!("logged in as {}", credentials.identifier);
    }
    logged_in
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn logout_link_means_accepted() {
        let html = r#"<a id="Stud_Logout" href="../SBLogin.aspx">Logout</a>"#;
        assert_eq!(login_outcome(html), LoginOutcome::Accepted);
    }

    #[test]
    fn message_is_the_rejection_reason() {
        let html = r#"<form><span id="lblMessage"> Invalid Username or Password </span></form>"#;
        assert_eq!(
            login_outcome(html),
            LoginOutcome::Rejected(Some("Invalid Username or Password".to_string()))
        );
    }

    #[test]
    fn bare_page_is_rejected_without_reason() {
        assert_eq!(login_outcome("<html></html>"), LoginOutcome::Rejected(None));
        let html = r#"<span id="lblMessage"></span>"#;
        assert_eq!(login_outcome(html), LoginOutcome::Rejected(None));
    }

    #[test]
    fn debug_output_hides_the_secret() {
        let credentials = Credentials::new("21FE1A0501", "hunter2");
        let shown = format!("{:?}", credentials);
        assert!(shown.contains("21FE1A0501"));
        assert!(!shown.contains("hunter2"));
    }
}
