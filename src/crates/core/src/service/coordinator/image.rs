//! Image path: plain single-flight, busy results while locked.

use super::image_response::ImageResponse;
use super::RequestCoordinator;
use crate::service::store::{ImageSlot, TabStateStore};
use crate::util::errors::{TrustMeterError, TrustMeterResult};
use crate::util::types::{ImageAnalysis, SessionId, TabId};
use dashmap::mapref::entry::Entry;
use log::{debug, info, warn};
use std::sync::Arc;

/// Holds the tab's image lock; dropping it releases the lock.
struct ImageLockGuard {
    store: Arc<TabStateStore>,
    tab_id: TabId,
    generation: u64,
}

impl Drop for ImageLockGuard {
    fn drop(&mut self) {
        if self.store.release_image(self.tab_id, self.generation) {
            debug!("Image lock released: tab_id={}", self.tab_id);
        }
    }
}

impl RequestCoordinator {
    pub async fn analyze_images(
        &self,
        tab_id: TabId,
        session_id: SessionId,
        urls: &[String],
    ) -> TrustMeterResult<Vec<ImageAnalysis>> {
        if urls.is_empty() {
            return Err(TrustMeterError::InvalidInput(
                "No image URLs provided.".to_string(),
            ));
        }

        let _guard = match self.try_lock_images(tab_id) {
            Some(guard) => guard,
            None => {
                warn!("Blocked new image request, analysis already in progress: tab_id={}", tab_id);
                return Ok(urls
                    .iter()
                    .map(|url| ImageAnalysis::busy(url, session_id.clone()))
                    .collect());
            }
        };

        info!("Analyzing images: tab_id={}, count={}", tab_id, urls.len());
        let data = self.backend.detect_image(&session_id, urls).await?;
        let results = ImageResponse::decode(data)?.into_results(urls, &session_id);
        debug!("Image analysis normalized: tab_id={}, results={}", tab_id, results.len());
        Ok(results)
    }

    fn try_lock_images(&self, tab_id: TabId) -> Option<ImageLockGuard> {
        match self.store.images.entry(tab_id) {
            Entry::Occupied(_) => None,
            Entry::Vacant(vacant) => {
                let generation = self.store.next_generation();
                vacant.insert(ImageSlot { generation });
                Some(ImageLockGuard {
                    store: self.store.clone(),
                    tab_id,
                    generation,
                })
            }
        }
    }
}
