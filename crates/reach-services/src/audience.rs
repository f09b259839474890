//! Audience resolver
//!
//! Compiles a declarative `AudienceFilter` into a predicate tree and
//! resolves it against the customer directory, scoped to a store set.
//! Output is ordered and phone-deduplicated; only customers with a phone
//! number qualify.

use reach_core::{
    models::{normalize_phone, AudienceFilter, Recipient},
    traits::CustomerDirectory,
    AppResult,
};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, instrument};
use uuid::Uuid;

/// Audience resolver service
pub struct AudienceResolver<C: CustomerDirectory> {
    directory: Arc<C>,
}

impl<C: CustomerDirectory> AudienceResolver<C> {
    /// Create a new audience resolver
    pub fn new(directory: Arc<C>) -> Self {
        Self { directory }
    }

    /// Resolve the filter into concrete recipients.
    ///
    /// Phones are normalized and deduplicated in resolution order, so a
    /// customer present in several member stores receives one message.
    #[instrument(skip(self, filter))]
    pub async fn resolve(
        &self,
        store_ids: &[Uuid],
        filter: &AudienceFilter,
        now: DateTime<Utc>,
    ) -> AppResult<Vec<Recipient>> {
        let predicate = filter.compile(now);
        let candidates = self.directory.find_recipients(store_ids, &predicate).await?;

        let mut seen = HashSet::new();
        let mut recipients = Vec::with_capacity(candidates.len());
        for mut recipient in candidates {
            recipient.phone = normalize_phone(&recipient.phone);
            if recipient.phone.is_empty() || !seen.insert(recipient.phone.clone()) {
                continue;
            }
            recipients.push(recipient);
        }

        debug!(
            "Resolved {} recipients ({:?}) across {} stores",
            recipients.len(),
            filter.target_type,
            store_ids.len()
        );

        Ok(recipients)
    }

    /// Count matching customers without materializing them
    #[instrument(skip(self, filter))]
    pub async fn count(
        &self,
        store_ids: &[Uuid],
        filter: &AudienceFilter,
        now: DateTime<Utc>,
    ) -> AppResult<i64> {
        let predicate = filter.compile(now);
        self.directory.count_matching(store_ids, &predicate).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reach_core::models::{Predicate, TargetType};
    use async_trait::async_trait;

    struct MockDirectory {
        recipients: Vec<Recipient>,
    }

    #[async_trait]
    impl CustomerDirectory for MockDirectory {
        async fn find_recipients(
            &self,
            _store_ids: &[Uuid],
            _predicate: &Predicate,
        ) -> AppResult<Vec<Recipient>> {
            Ok(self.recipients.clone())
        }

        async fn count_matching(
            &self,
            _store_ids: &[Uuid],
            _predicate: &Predicate,
        ) -> AppResult<i64> {
            Ok(self.recipients.len() as i64)
        }
    }

    fn recipient(phone: &str) -> Recipient {
        Recipient {
            customer_id: Uuid::new_v4(),
            phone: phone.to_string(),
            name: None,
        }
    }

    #[tokio::test]
    async fn test_resolve_dedupes_by_normalized_phone() {
        let directory = Arc::new(MockDirectory {
            recipients: vec![
                recipient("010-1234-5678"),
                recipient("01012345678"),
                recipient("+82 10 1234 5678"),
                recipient("01099998888"),
            ],
        });
        let resolver = AudienceResolver::new(directory);

        let filter = AudienceFilter {
            target_type: TargetType::All,
            ..Default::default()
        };
        let recipients = resolver
            .resolve(&[Uuid::new_v4()], &filter, Utc::now())
            .await
            .unwrap();

        assert_eq!(recipients.len(), 2);
        assert_eq!(recipients[0].phone, "01012345678");
        assert_eq!(recipients[1].phone, "01099998888");
    }

    #[tokio::test]
    async fn test_resolve_preserves_order() {
        let directory = Arc::new(MockDirectory {
            recipients: vec![
                recipient("01011112222"),
                recipient("01033334444"),
                recipient("01055556666"),
            ],
        });
        let resolver = AudienceResolver::new(directory);

        let recipients = resolver
            .resolve(&[Uuid::new_v4()], &AudienceFilter::default(), Utc::now())
            .await
            .unwrap();

        let phones: Vec<&str> = recipients.iter().map(|r| r.phone.as_str()).collect();
        assert_eq!(phones, vec!["01011112222", "01033334444", "01055556666"]);
    }
}
