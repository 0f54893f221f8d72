//! Read-side operations and entry selection.

use std::fmt;

use crate::app::QueueApp;
use crate::domain::{EntryId, QueueEntry, QueueError, Status};
use crate::observability::QueueCounts;
use crate::ports::EntryFilter;

/// How a command names the entries it acts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntrySelector {
    Id(EntryId),
    PathEquals(String),
    PathContains(String),
    JobIdContains(String),
}

impl EntrySelector {
    fn filter(&self) -> Option<EntryFilter> {
        match self {
            Self::Id(_) => None,
            Self::PathEquals(path) => Some(EntryFilter::all().path_equals(path)),
            Self::PathContains(fragment) => Some(EntryFilter::all().path_contains(fragment)),
            Self::JobIdContains(fragment) => Some(EntryFilter::all().job_id_contains(fragment)),
        }
    }
}

impl fmt::Display for EntrySelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "id {id}"),
            Self::PathEquals(path) => write!(f, "path '{path}'"),
            Self::PathContains(fragment) => write!(f, "path containing '{fragment}'"),
            Self::JobIdContains(fragment) => write!(f, "job id containing '{fragment}'"),
        }
    }
}

impl QueueApp {
    /// Entries matching `filter`, oldest first.
    pub async fn list(&self, filter: &EntryFilter) -> Result<Vec<QueueEntry>, QueueError> {
        Ok(self.store.list(filter).await?)
    }

    /// Per-status counts, optionally restricted to paths containing `path_contains`.
    pub async fn summarize(&self, path_contains: Option<&str>) -> Result<QueueCounts, QueueError> {
        let filter = match path_contains {
            Some(fragment) if !fragment.is_empty() => EntryFilter::all().path_contains(fragment),
            _ => EntryFilter::all(),
        };
        Ok(self.store.count_by_status(&filter).await?)
    }

    /// Entries matched by `selector` whose status is one of `statuses`
    /// (any status when empty), oldest first.
    pub async fn select(
        &self,
        selector: &EntrySelector,
        statuses: &[Status],
    ) -> Result<Vec<QueueEntry>, QueueError> {
        if let EntrySelector::Id(id) = selector {
            return Ok(self
                .store
                .get(*id)
                .await?
                .into_iter()
                .filter(|e| statuses.is_empty() || statuses.contains(&e.status))
                .collect());
        }
        let filter = selector.filter().unwrap_or_default();
        Ok(self
            .store
            .list(&filter.statuses(statuses.iter().copied()))
            .await?)
    }

    /// Exactly one entry, or `NotFound` / `AmbiguousMatch`.
    pub async fn find_one(&self, selector: &EntrySelector) -> Result<QueueEntry, QueueError> {
        let mut matches = self.select(selector, &[]).await?;
        match matches.len() {
            0 => Err(QueueError::NotFound(selector.to_string())),
            1 => Ok(matches.remove(0)),
            count => Err(QueueError::AmbiguousMatch {
                selector: selector.to_string(),
                count,
            }),
        }
    }

    /// The job script dispatch would submit for the selected entry.
    pub async fn script_for(
        &self,
        selector: &EntrySelector,
        test_job: bool,
    ) -> Result<String, QueueError> {
        let entry = self.find_one(selector).await?;
        Ok(self.renderer.render(&entry, test_job))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::testing::Harness;
    use crate::ports::EntryStore;

    #[tokio::test]
    async fn list_filters_by_status_and_path() {
        let h = Harness::new();
        h.add("/data/tasmax_day.nc", 1).await;
        h.add("/data/pr_day.nc", 2).await;
        h.add("/data/tasmin_day.nc", 3).await;
        h.app.dispatch(1).await.unwrap();

        let tas = h
            .app
            .list(&EntryFilter::all().path_contains("tas"))
            .await
            .unwrap();
        assert_eq!(tas.len(), 2);

        let new_tas = h
            .app
            .list(&EntryFilter::all().path_contains("tas").status(Status::New))
            .await
            .unwrap();
        assert_eq!(new_tas.len(), 1);
        assert_eq!(new_tas[0].input_path, "/data/tasmin_day.nc");

        let by_job = h
            .app
            .list(&EntryFilter::all().job_id_contains("1.serv"))
            .await
            .unwrap();
        assert_eq!(by_job[0].input_path, "/data/tasmax_day.nc");
    }

    #[tokio::test]
    async fn summarize_counts_per_status() {
        let h = Harness::new();
        h.add("/data/a.nc", 1).await;
        h.add("/data/b.nc", 2).await;
        h.add("/other/c.nc", 3).await;
        h.app.dispatch(1).await.unwrap();

        let all = h.app.summarize(None).await.unwrap();
        assert_eq!(all.new, 2);
        assert_eq!(all.submitted, 1);

        let data = h.app.summarize(Some("/data/")).await.unwrap();
        assert_eq!(data.total(), 2);
    }

    #[tokio::test]
    async fn find_one_reports_lookup_failures() {
        let h = Harness::new();
        h.add("/data/a.nc", 1).await;
        h.add("/data/ab.nc", 2).await;

        let missing = h
            .app
            .find_one(&EntrySelector::PathEquals("/data/zz.nc".into()))
            .await
            .unwrap_err();
        assert!(matches!(missing, QueueError::NotFound(_)));

        let ambiguous = h
            .app
            .find_one(&EntrySelector::PathContains("/data/a".into()))
            .await
            .unwrap_err();
        assert!(matches!(
            ambiguous,
            QueueError::AmbiguousMatch { count: 2, .. }
        ));

        let exact = h
            .app
            .find_one(&EntrySelector::PathEquals("/data/a.nc".into()))
            .await
            .unwrap();
        let by_id = h.app.find_one(&EntrySelector::Id(exact.id)).await.unwrap();
        assert_eq!(by_id, exact);
    }

    #[tokio::test]
    async fn select_by_id_respects_statuses() {
        let h = Harness::new();
        let added = h.add("/data/a.nc", 1).await;
        assert!(
            h.app
                .select(&EntrySelector::Id(added.id), &[Status::Hold])
                .await
                .unwrap()
                .is_empty()
        );
        assert_eq!(
            h.app
                .select(&EntrySelector::Id(added.id), &[Status::New])
                .await
                .unwrap()
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn script_for_renders_test_variant() {
        let h = Harness::new();
        let added = h.add("/data/tasmax.nc", 1).await;
        let script = h
            .app
            .script_for(&EntrySelector::Id(added.id), true)
            .await
            .unwrap();
        assert!(script.contains("echo"));
        assert!(script.contains("/data/tasmax.nc"));
        assert_eq!(h.store.get(added.id).await.unwrap().unwrap(), added);
    }
}
