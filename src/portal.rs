use tokio::sync::Mutex;

use crate::{
    auth::{self, Credentials},
    config::PortalConfig,
    marks,
    marks_table::{ExamPeriod, Semester, SubjectRecord},
    requests::SessionClient,
};

/// One student's session with the portal.
///
/// Login and marks retrieval both drive a GET-then-postback against
/// server-side form state, so they are run one at a time per session.
pub struct Portal {
    session_client: SessionClient,
    flow_lock: Mutex<()>,
}

impl Portal {
    pub fn new(config: &PortalConfig) -> anyhow::Result<Self> {
        let session_client = SessionClient::new(config)?;
        Ok(Portal {
            session_client,
            flow_lock: Mutex::new(()),
        })
    }

    pub fn session_client(&self) -> &SessionClient {
        &self.session_client
    }

    pub fn is_authenticated(&self) -> bool {
        self.session_client.is_authenticated()
    }

    pub async fn login(&self, credentials: &Credentials) -> bool {
        let _flow = self.flow_lock.lock().await;
        auth::login(&self.session_client, credentials).await
    }

    pub async fn get_marks(&self, semester: Semester, exam_period: ExamPeriod) -> Vec<SubjectRecord> {
        let _flow = self.flow_lock.lock().await;
        marks::get_marks(&self.session_client, semester, exam_period).await
    }

    /// Forgets the session locally; the next call has to log in again.
    pub async fn logout(&self) {
        let _flow = self.flow_lock.lock().await;
        self.session_client.reset().await;
    }
}
