// Copyright 2025 Catalog Contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Dispatch store: fans operations out across an ordered sequence of
//! backing [`DefinitionStore`]s.
//!
//! | Operation | Policy |
//! |---|---|
//! | `initialize` | run on all; wait for all |
//! | `get`/`list`/`find` | run on all concurrently; first non-absent wins; errors logged as absent |
//! | `store`/`delete` | run on all concurrently; wait for all; first successful result returned |

use crate::definition::{DefinitionStore, FindPage, FindQuery};
use async_trait::async_trait;
use catalog_core::{CatalogError, Definition, EntityCoordinates, Result};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::warn;

pub struct DispatchStore {
    backends: Vec<Arc<dyn DefinitionStore>>,
    /// Bounds in-flight concurrent backend calls per fan-out (default 10).
    concurrency: Arc<Semaphore>,
}

impl DispatchStore {
    pub fn new(backends: Vec<Arc<dyn DefinitionStore>>, concurrency: usize) -> Self {
        Self {
            backends,
            concurrency: Arc::new(Semaphore::new(concurrency.max(1))),
        }
    }

    async fn permit(&self) -> tokio::sync::OwnedSemaphorePermit {
        self.concurrency
            .clone()
            .acquire_owned()
            .await
            .expect("dispatch semaphore is never closed")
    }
}

#[async_trait]
impl DefinitionStore for DispatchStore {
    async fn get(&self, coordinates: &EntityCoordinates, schema_version: &str) -> Result<Option<Definition>> {
        let mut tasks = Vec::with_capacity(self.backends.len());
        for backend in &self.backends {
            let backend = backend.clone();
            let coordinates = coordinates.clone();
            let schema_version = schema_version.to_string();
            let permit = self.permit().await;
            tasks.push(tokio::spawn(async move {
                let _permit = permit;
                backend.get(&coordinates, &schema_version).await
            }));
        }
        for task in tasks {
            match task.await {
                Ok(Ok(Some(def))) => return Ok(Some(def)),
                Ok(Ok(None)) => {}
                Ok(Err(e)) => warn!(error = %e, "dispatch get backend failed, treating as absent"),
                Err(e) => warn!(error = %e, "dispatch get backend task panicked"),
            }
        }
        Ok(None)
    }

    async fn list(&self, coordinates_prefix: &EntityCoordinates) -> Result<Vec<String>> {
        let mut tasks = Vec::with_capacity(self.backends.len());
        for backend in &self.backends {
            let backend = backend.clone();
            let prefix = coordinates_prefix.clone();
            let permit = self.permit().await;
            tasks.push(tokio::spawn(async move {
                let _permit = permit;
                backend.list(&prefix).await
            }));
        }
        for task in tasks {
            match task.await {
                Ok(Ok(list)) if !list.is_empty() => return Ok(list),
                Ok(Ok(_)) => {}
                Ok(Err(e)) => warn!(error = %e, "dispatch list backend failed, treating as absent"),
                Err(e) => warn!(error = %e, "dispatch list backend task panicked"),
            }
        }
        Ok(Vec::new())
    }

    async fn store(&self, coordinates: &EntityCoordinates, schema_version: &str, definition: &Definition) -> Result<()> {
        let mut tasks = Vec::with_capacity(self.backends.len());
        for backend in &self.backends {
            let backend = backend.clone();
            let coordinates = coordinates.clone();
            let schema_version = schema_version.to_string();
            let definition = definition.clone();
            let permit = self.permit().await;
            tasks.push(tokio::spawn(async move {
                let _permit = permit;
                backend.store(&coordinates, &schema_version, &definition).await
            }));
        }
        let mut first_ok = None;
        for task in tasks {
            match task.await {
                Ok(Ok(())) => {
                    if first_ok.is_none() {
                        first_ok = Some(Ok(()));
                    }
                }
                Ok(Err(e)) => warn!(error = %e, "dispatch store backend failed"),
                Err(e) => warn!(error = %e, "dispatch store backend task panicked"),
            }
        }
        first_ok.unwrap_or(Err(CatalogError::UpstreamTransient(
            "every dispatch backend rejected the store".to_string(),
        )))
    }

    async fn delete(&self, coordinates: &EntityCoordinates, schema_version: &str) -> Result<()> {
        let mut tasks = Vec::with_capacity(self.backends.len());
        for backend in &self.backends {
            let backend = backend.clone();
            let coordinates = coordinates.clone();
            let schema_version = schema_version.to_string();
            let permit = self.permit().await;
            tasks.push(tokio::spawn(async move {
                let _permit = permit;
                backend.delete(&coordinates, &schema_version).await
            }));
        }
        let mut first_ok = None;
        for task in tasks {
            match task.await {
                Ok(Ok(())) => {
                    if first_ok.is_none() {
                        first_ok = Some(Ok(()));
                    }
                }
                Ok(Err(e)) => warn!(error = %e, "dispatch delete backend failed"),
                Err(e) => warn!(error = %e, "dispatch delete backend task panicked"),
            }
        }
        first_ok.unwrap_or(Err(CatalogError::UpstreamTransient(
            "every dispatch backend rejected the delete".to_string(),
        )))
    }

    async fn find(&self, query: &FindQuery, continuation_token: Option<&str>) -> Result<FindPage> {
        let mut tasks = Vec::with_capacity(self.backends.len());
        for backend in &self.backends {
            let backend = backend.clone();
            let query = query.clone();
            let continuation_token = continuation_token.map(str::to_string);
            let permit = self.permit().await;
            tasks.push(tokio::spawn(async move {
                let _permit = permit;
                backend.find(&query, continuation_token.as_deref()).await
            }));
        }
        for task in tasks {
            match task.await {
                Ok(Ok(page)) if !page.definitions.is_empty() => return Ok(page),
                Ok(Ok(_)) => {}
                Ok(Err(e)) => warn!(error = %e, "dispatch find backend failed, treating as absent"),
                Err(e) => warn!(error = %e, "dispatch find backend task panicked"),
            }
        }
        Ok(FindPage::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::InMemoryDefinitionStore;

    struct AlwaysFails;

    #[async_trait]
    impl DefinitionStore for AlwaysFails {
        async fn get(&self, _coordinates: &EntityCoordinates, _schema_version: &str) -> Result<Option<Definition>> {
            Err(CatalogError::UpstreamTransient("backend down".to_string()))
        }
        async fn list(&self, _coordinates_prefix: &EntityCoordinates) -> Result<Vec<String>> {
            Err(CatalogError::UpstreamTransient("backend down".to_string()))
        }
        async fn store(&self, _coordinates: &EntityCoordinates, _schema_version: &str, _definition: &Definition) -> Result<()> {
            Err(CatalogError::UpstreamTransient("backend down".to_string()))
        }
        async fn delete(&self, _coordinates: &EntityCoordinates, _schema_version: &str) -> Result<()> {
            Err(CatalogError::UpstreamTransient("backend down".to_string()))
        }
        async fn find(&self, _query: &FindQuery, _continuation_token: Option<&str>) -> Result<FindPage> {
            Err(CatalogError::UpstreamTransient("backend down".to_string()))
        }
    }

    fn coords() -> EntityCoordinates {
        EntityCoordinates::parse("npm/npmjs/-/left-pad/1.3.0").unwrap()
    }

    #[tokio::test]
    async fn get_treats_failed_backend_as_absent_and_returns_the_other() {
        let good = Arc::new(InMemoryDefinitionStore::new());
        let mut def = Definition::empty();
        def.set_coordinates(&coords());
        good.store(&coords(), "1.0.0", &def).await.unwrap();

        let dispatch = DispatchStore::new(vec![Arc::new(AlwaysFails), good], 4);
        let found = dispatch.get(&coords(), "1.0.0").await.unwrap();
        assert!(found.is_some());
    }

    #[tokio::test]
    async fn get_returns_none_when_all_backends_are_absent() {
        let a = Arc::new(InMemoryDefinitionStore::new());
        let b = Arc::new(InMemoryDefinitionStore::new());
        let dispatch = DispatchStore::new(vec![a, b], 4);
        assert!(dispatch.get(&coords(), "1.0.0").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn store_succeeds_if_at_least_one_backend_accepts() {
        let failing = Arc::new(AlwaysFails);
        let good = Arc::new(InMemoryDefinitionStore::new());
        let dispatch = DispatchStore::new(vec![failing, good.clone()], 4);

        let mut def = Definition::empty();
        def.set_coordinates(&coords());
        dispatch.store(&coords(), "1.0.0", &def).await.unwrap();
        assert!(good.get(&coords(), "1.0.0").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn store_fails_when_every_backend_rejects() {
        let dispatch = DispatchStore::new(vec![Arc::new(AlwaysFails), Arc::new(AlwaysFails)], 4);
        let mut def = Definition::empty();
        def.set_coordinates(&coords());
        let result = dispatch.store(&coords(), "1.0.0", &def).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn concurrency_cap_of_zero_is_clamped_to_one() {
        let dispatch = DispatchStore::new(vec![Arc::new(InMemoryDefinitionStore::new())], 0);
        assert!(dispatch.get(&coords(), "1.0.0").await.unwrap().is_none());
    }
}
