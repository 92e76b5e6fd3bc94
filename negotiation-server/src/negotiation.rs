//! Provider-side negotiation message handlers.
//!
//! Each operation resolves its record through the store, asks the state
//! machine for the next record value and persists it explicitly. Operations
//! never write when the state is unchanged.

use std::sync::Arc;

use negotiation_core::{
    transition, EventType, InboundMessage, MessageKind, NegotiationError, NegotiationRecord,
    NegotiationResult, Role,
};

use crate::store::NegotiationStore;

/// This service only ever evaluates messages as the provider.
const ROLE: Role = Role::Provider;

/// Message handlers over an injected store.
#[derive(Clone)]
pub struct NegotiationService {
    store: Arc<dyn NegotiationStore>,
}

impl NegotiationService {
    pub fn new(store: Arc<dyn NegotiationStore>) -> Self {
        Self { store }
    }

    async fn load(&self, provider_pid: &str) -> NegotiationResult<NegotiationRecord> {
        self.store
            .find_by_provider_pid(provider_pid)
            .await?
            .ok_or_else(|| NegotiationError::not_found(provider_pid))
    }

    /// Load, transition, persist.
    async fn advance(
        &self,
        provider_pid: &str,
        message: MessageKind,
    ) -> NegotiationResult<NegotiationRecord> {
        let record = self.load(provider_pid).await?;
        let next = record.apply(message, ROLE).map_err(|rejection| {
            tracing::warn!("Negotiation {}: {}", provider_pid, rejection);
            rejection
        })?;

        if next.state() == record.state() {
            tracing::debug!(
                "Negotiation {}: {} left state {} unchanged",
                provider_pid,
                message,
                record.state()
            );
            return Ok(record);
        }

        let saved = self.store.save(next).await.map_err(|e| {
            tracing::warn!("Negotiation {}: save failed: {}", provider_pid, e);
            e
        })?;
        tracing::info!(
            "Negotiation {}: {} -> {} ({})",
            provider_pid,
            record.state(),
            saved.state(),
            message
        );
        Ok(saved)
    }

    /// `GET /negotiations/{providerPid}`
    pub async fn get_negotiation(&self, provider_pid: &str) -> NegotiationResult<NegotiationRecord> {
        self.load(provider_pid).await
    }

    /// `POST /negotiations/request`: create a negotiation, or re-fetch the
    /// one named by `dspace:providerPid`.
    pub async fn request_negotiation(
        &self,
        message: &InboundMessage,
    ) -> NegotiationResult<NegotiationRecord> {
        if let Some(provider_pid) = message.provider_pid.as_deref() {
            return self.advance(provider_pid, MessageKind::ContractRequest).await;
        }

        let consumer_pid = message
            .consumer_pid
            .as_deref()
            .ok_or_else(|| NegotiationError::bad_request("'dspace:consumerPid' is required"))?;
        self.create(consumer_pid, MessageKind::ContractRequest).await
    }

    /// Provider-initiated offer: creates a negotiation in `OFFERED`.
    pub async fn offer_negotiation(&self, consumer_pid: &str) -> NegotiationResult<NegotiationRecord> {
        self.create(consumer_pid, MessageKind::ProviderOffer).await
    }

    /// Counter-offer on an existing `REQUESTED` negotiation.
    pub async fn counter_offer(&self, provider_pid: &str) -> NegotiationResult<NegotiationRecord> {
        self.advance(provider_pid, MessageKind::ProviderOffer).await
    }

    /// `POST /negotiations/{providerPid}/request`
    pub async fn accept_offer(&self, provider_pid: &str) -> NegotiationResult<NegotiationRecord> {
        self.advance(provider_pid, MessageKind::OfferAcceptance).await
    }

    /// `POST /negotiations/{providerPid}/events`
    // TODO: check that the caller is the consumer bound to this negotiation
    // once requests carry an authenticated identity.
    pub async fn handle_event(
        &self,
        provider_pid: &str,
        event: EventType,
    ) -> NegotiationResult<NegotiationRecord> {
        self.advance(provider_pid, MessageKind::Event(event)).await
    }

    /// `POST /negotiations/{providerPid}/agreement/verification`
    pub async fn verify_agreement(&self, provider_pid: &str) -> NegotiationResult<NegotiationRecord> {
        self.advance(provider_pid, MessageKind::AgreementVerification)
            .await
    }

    /// `POST /negotiations/{providerPid}/termination`
    pub async fn terminate(&self, provider_pid: &str) -> NegotiationResult<NegotiationRecord> {
        self.advance(provider_pid, MessageKind::Termination).await
    }

    /// Correlate a consumer identifier with the latest negotiation it started.
    pub async fn find_by_consumer_pid(
        &self,
        consumer_pid: &str,
    ) -> NegotiationResult<Option<NegotiationRecord>> {
        Ok(self.store.find_by_consumer_pid(consumer_pid).await?)
    }

    async fn create(
        &self,
        consumer_pid: &str,
        message: MessageKind,
    ) -> NegotiationResult<NegotiationRecord> {
        let initial = transition(None, message, ROLE)?;
        let record = self.store.create(consumer_pid, initial).await?;
        tracing::info!(
            "Negotiation {} created for consumer {} in {}",
            record.provider_pid(),
            record.consumer_pid,
            record.state()
        );
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use negotiation_core::{is_urn_uuid, NegotiationState, Rejection};

    use crate::store::{MemoryStore, StoreError};

    /// Counts writes going through to the wrapped store.
    #[derive(Default)]
    struct CountingStore {
        inner: MemoryStore,
        creates: AtomicUsize,
        saves: AtomicUsize,
    }

    #[async_trait]
    impl NegotiationStore for CountingStore {
        async fn find_by_provider_pid(
            &self,
            provider_pid: &str,
        ) -> Result<Option<NegotiationRecord>, StoreError> {
            self.inner.find_by_provider_pid(provider_pid).await
        }

        async fn find_by_consumer_pid(
            &self,
            consumer_pid: &str,
        ) -> Result<Option<NegotiationRecord>, StoreError> {
            self.inner.find_by_consumer_pid(consumer_pid).await
        }

        async fn create(
            &self,
            consumer_pid: &str,
            initial_state: NegotiationState,
        ) -> Result<NegotiationRecord, StoreError> {
            self.creates.fetch_add(1, Ordering::SeqCst);
            self.inner.create(consumer_pid, initial_state).await
        }

        async fn save(&self, record: NegotiationRecord) -> Result<NegotiationRecord, StoreError> {
            self.saves.fetch_add(1, Ordering::SeqCst);
            self.inner.save(record).await
        }
    }

    fn service() -> (NegotiationService, Arc<CountingStore>) {
        let store = Arc::new(CountingStore::default());
        (NegotiationService::new(store.clone()), store)
    }

    fn request_from(consumer_pid: &str) -> InboundMessage {
        InboundMessage {
            consumer_pid: Some(consumer_pid.to_string()),
            ..Default::default()
        }
    }

    fn refetch(provider_pid: &str) -> InboundMessage {
        InboundMessage {
            provider_pid: Some(provider_pid.to_string()),
            consumer_pid: Some("urn:uuid:c1".to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn request_creates_requested_negotiation() {
        let (service, store) = service();
        let record = service
            .request_negotiation(&request_from("urn:uuid:c1"))
            .await
            .unwrap();

        assert!(is_urn_uuid(record.provider_pid()));
        assert_eq!(record.consumer_pid, "urn:uuid:c1");
        assert_eq!(record.state(), NegotiationState::Requested);
        assert_eq!(store.creates.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn repeated_requests_are_not_deduplicated() {
        let (service, store) = service();
        let first = service
            .request_negotiation(&request_from("urn:uuid:c1"))
            .await
            .unwrap();
        let second = service
            .request_negotiation(&request_from("urn:uuid:c1"))
            .await
            .unwrap();

        assert_ne!(first.provider_pid(), second.provider_pid());
        assert_eq!(store.inner.len().await, 2);
    }

    #[tokio::test]
    async fn refetch_returns_existing_record_unchanged() {
        let (service, store) = service();
        let created = service
            .request_negotiation(&request_from("urn:uuid:c1"))
            .await
            .unwrap();
        let accepted = service
            .handle_event(created.provider_pid(), EventType::Accepted)
            .await
            .unwrap();

        let fetched = service
            .request_negotiation(&refetch(created.provider_pid()))
            .await
            .unwrap();

        assert_eq!(fetched, accepted);
        assert_eq!(store.creates.load(Ordering::SeqCst), 1);
        assert_eq!(store.saves.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn refetch_unknown_provider_pid_is_not_found() {
        let (service, store) = service();
        let err = service
            .request_negotiation(&refetch("urn:uuid:unknown"))
            .await
            .unwrap_err();

        assert!(matches!(err, NegotiationError::NotFound { .. }));
        assert_eq!(store.creates.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn request_without_any_pid_is_bad_request() {
        let (service, _) = service();
        let err = service
            .request_negotiation(&InboundMessage::default())
            .await
            .unwrap_err();
        assert!(matches!(err, NegotiationError::BadRequest { .. }));
    }

    #[tokio::test]
    async fn unknown_provider_pid_fails_before_persistence() {
        let (service, store) = service();
        let pid = "urn:uuid:unknown";

        assert!(matches!(
            service.get_negotiation(pid).await,
            Err(NegotiationError::NotFound { .. })
        ));
        assert!(matches!(
            service.handle_event(pid, EventType::Accepted).await,
            Err(NegotiationError::NotFound { .. })
        ));
        assert!(matches!(
            service.verify_agreement(pid).await,
            Err(NegotiationError::NotFound { .. })
        ));
        assert!(matches!(
            service.accept_offer(pid).await,
            Err(NegotiationError::NotFound { .. })
        ));
        assert!(matches!(
            service.terminate(pid).await,
            Err(NegotiationError::NotFound { .. })
        ));

        assert_eq!(store.saves.load(Ordering::SeqCst), 0);
        assert_eq!(store.creates.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn accept_offer_moves_to_requested_unless_offered() {
        let (service, store) = service();
        let requested = service
            .request_negotiation(&request_from("urn:uuid:c1"))
            .await
            .unwrap();
        let verified = service.verify_agreement(requested.provider_pid()).await.unwrap();
        assert_eq!(verified.state(), NegotiationState::Verified);

        let back = service.accept_offer(requested.provider_pid()).await.unwrap();
        assert_eq!(back.state(), NegotiationState::Requested);

        let offered = service.offer_negotiation("urn:uuid:c2").await.unwrap();
        let saves_before = store.saves.load(Ordering::SeqCst);
        let still = service.accept_offer(offered.provider_pid()).await.unwrap();
        assert_eq!(still.state(), NegotiationState::Offered);
        assert_eq!(store.saves.load(Ordering::SeqCst), saves_before);
    }

    #[tokio::test]
    async fn full_provider_offer_flow() {
        let (service, _) = service();
        let offered = service.offer_negotiation("urn:uuid:c1").await.unwrap();
        assert_eq!(offered.state(), NegotiationState::Offered);
        let pid = offered.provider_pid().to_string();

        let accepted = service.handle_event(&pid, EventType::Accepted).await.unwrap();
        assert_eq!(accepted.state(), NegotiationState::Accepted);

        let verified = service.verify_agreement(&pid).await.unwrap();
        assert_eq!(verified.state(), NegotiationState::Verified);

        let finalized = service.handle_event(&pid, EventType::Finalized).await.unwrap();
        assert_eq!(finalized.state(), NegotiationState::Finalized);
        assert_eq!(finalized.version, 3);

        let err = service.terminate(&pid).await.unwrap_err();
        assert!(matches!(
            err,
            NegotiationError::Rejected(Rejection::Closed { .. })
        ));
    }

    #[tokio::test]
    async fn counter_offer_on_request() {
        let (service, _) = service();
        let requested = service
            .request_negotiation(&request_from("urn:uuid:c1"))
            .await
            .unwrap();
        let offered = service.counter_offer(requested.provider_pid()).await.unwrap();
        assert_eq!(offered.state(), NegotiationState::Offered);

        let err = service.counter_offer(requested.provider_pid()).await.unwrap_err();
        assert!(matches!(
            err,
            NegotiationError::Rejected(Rejection::Illegal { .. })
        ));
    }

    #[tokio::test]
    async fn finalize_event_before_verification_is_rejected() {
        let (service, store) = service();
        let requested = service
            .request_negotiation(&request_from("urn:uuid:c1"))
            .await
            .unwrap();

        let err = service
            .handle_event(requested.provider_pid(), EventType::Finalized)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            NegotiationError::Rejected(Rejection::Illegal { .. })
        ));
        assert_eq!(store.saves.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn terminated_negotiation_is_final() {
        let (service, store) = service();
        let pid = service
            .request_negotiation(&request_from("urn:uuid:c1"))
            .await
            .unwrap()
            .provider_pid()
            .to_string();

        let terminated = service.terminate(&pid).await.unwrap();
        assert_eq!(terminated.state(), NegotiationState::Terminated);
        let saves = store.saves.load(Ordering::SeqCst);

        let again = service.terminate(&pid).await.unwrap();
        assert_eq!(again, terminated);

        for result in [
            service.handle_event(&pid, EventType::Accepted).await,
            service.verify_agreement(&pid).await,
            service.accept_offer(&pid).await,
        ] {
            assert!(matches!(
                result,
                Err(NegotiationError::Rejected(Rejection::Closed { .. }))
            ));
        }
        assert_eq!(store.saves.load(Ordering::SeqCst), saves);
        assert_eq!(
            service.get_negotiation(&pid).await.unwrap().state(),
            NegotiationState::Terminated
        );
    }

    #[tokio::test]
    async fn stale_record_conflicts() {
        let store = Arc::new(MemoryStore::new());
        let service = NegotiationService::new(store.clone());
        let created = service
            .request_negotiation(&request_from("urn:uuid:c1"))
            .await
            .unwrap();

        // A concurrent writer commits first.
        let stale = created
            .apply(MessageKind::Event(EventType::Accepted), ROLE)
            .unwrap();
        service.verify_agreement(created.provider_pid()).await.unwrap();

        let err = NegotiationError::from(store.save(stale).await.unwrap_err());
        assert!(matches!(err, NegotiationError::Conflict { .. }));
    }

    #[tokio::test]
    async fn consumer_lookup() {
        let (service, _) = service();
        let created = service
            .request_negotiation(&request_from("urn:uuid:c9"))
            .await
            .unwrap();

        assert_eq!(
            service.find_by_consumer_pid("urn:uuid:c9").await.unwrap(),
            Some(created)
        );
        assert_eq!(service.find_by_consumer_pid("urn:uuid:zz").await.unwrap(), None);
    }
}
