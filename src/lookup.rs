//! Cache-first retrieval of one selection's marks.

use chrono::{DateTime, Utc};
use log::{info, warn};

use crate::{
    auth::Credentials,
    marks_table::{ExamPeriod, Semester, SubjectRecord, is_placeholder_result},
    portal::Portal,
    store::{CachedMarks, KeyValueStore, MarksCache},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    /// Served from the cache without contacting the portal.
    Cache(DateTime<Utc>),
    Portal,
    /// The portal could not deliver marks, so an older cached copy is shown.
    StaleCache(DateTime<Utc>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Lookup {
    pub records: Vec<SubjectRecord>,
    pub source: Source,
}

impl Lookup {
    fn from_cache(cached: CachedMarks, stale: bool) -> Self {
        let source = if stale {
            Source::StaleCache(cached.fetched_at)
        } else {
            Source::Cache(cached.fetched_at)
        };
        Self {
            records: cached.records,
            source,
        }
    }
}

fn load_cached<S: KeyValueStore>(
    cache: Option<&MarksCache<S>>,
    semester: Semester,
    exam_period: ExamPeriod,
) -> Option<CachedMarks> {
    match cache?.load(semester, exam_period) {
        Ok(cached) => cached,
        Err(e) => {
            warn!("could not read marks cache: {:#}", e);
            None
        }
    }
}

/// Marks for one selection, preferring the cache unless `refresh` is set.
///
/// Only a failed login with nothing cached is an error. Cache failures are
/// logged and otherwise ignored.
pub async fn lookup_marks<S: KeyValueStore>(
    portal: &Portal,
    credentials: &Credentials,
    cache: Option<&MarksCache<S>>,
    semester: Semester,
    exam_period: ExamPeriod,
    refresh: bool,
) -> anyhow::Result<Lookup> {
    if !refresh {
        if let Some(cached) = load_cached(cache, semester, exam_period) {
            info!(
                "using marks cached at {} for semester {}, {}",
                cached.fetched_at, semester, exam_period
            );
            return Ok(Lookup::from_cache(cached, false));
        }
    }

    if !portal.is_authenticated() && !portal.login(credentials).await {
        return match load_cached(cache, semester, exam_period) {
            Some(cached) => {
                warn!(
                    "could not log in as {}, showing marks cached at {}",
                    credentials.identifier, cached.fetched_at
                );
                Ok(Lookup::from_cache(cached, true))
            }
            None => Err(anyhow::anyhow!(
                "could not log in to {} as {}",
                portal.session_client().base_url(),
                credentials.identifier
            )),
        };
    }

    let records = portal.get_marks(semester, exam_period).await;

    if is_placeholder_result(&records) {
        if let Some(cached) = load_cached(cache, semester, exam_period) {
            warn!(
                "portal returned no marks, showing results cached at {}",
                cached.fetched_at
            );
            return Ok(Lookup::from_cache(cached, true));
        }
    } else if let Some(cache) = cache {
        match cache.save(semester, exam_period, &records) {
            Ok(true) => info!("cached marks for semester {}, {}", semester, exam_period),
            Ok(false) => {}
            Err(e) => warn!("could not cache marks: {:#}", e),
        }
    }

    Ok(Lookup {
        records,
        source: Source::Portal,
    })
}
