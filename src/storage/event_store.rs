//! Event store service over a document layout.
//!
//! Composes a layout strategy, a serializer, an upcaster chain and the two
//! collection handles into append / replay / scan operations for one payload
//! type. Holds no mutable state between calls.

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::codec;
use super::criteria::{self, Criteria};
use super::document::{DocumentCollection, StoreError};
use super::snapshot;
use super::strategy::StorageStrategy;
use super::stream::{self, DocumentStream};
use super::{Result, StorageError, StorageHandles};
use crate::domain::DomainEventMessage;
use crate::serialization::{Serializer, UpcasterChain};

/// Append-only event store for payloads of type `P`.
pub struct DocumentEventStore<P> {
    strategy: Arc<dyn StorageStrategy>,
    events: Arc<dyn DocumentCollection>,
    snapshots: Arc<dyn DocumentCollection>,
    serializer: Arc<dyn Serializer<P>>,
    upcasters: UpcasterChain,
    skip_unknown_types: bool,
}

impl<P> DocumentEventStore<P> {
    pub fn new(handles: StorageHandles, serializer: Arc<dyn Serializer<P>>) -> Self {
        Self {
            strategy: handles.strategy,
            events: handles.events,
            snapshots: handles.snapshots,
            serializer,
            upcasters: UpcasterChain::passthrough(),
            skip_unknown_types: handles.skip_unknown_types,
        }
    }

    pub fn with_upcasters(mut self, upcasters: UpcasterChain) -> Self {
        self.upcasters = upcasters;
        self
    }

    /// Leave out events whose payload type cannot be resolved instead of
    /// failing the read.
    pub fn with_skip_unknown_types(mut self, skip: bool) -> Self {
        self.skip_unknown_types = skip;
        self
    }

    pub fn strategy(&self) -> &dyn StorageStrategy {
        self.strategy.as_ref()
    }

    /// Create the layout's indexes. Run once at startup.
    pub async fn ensure_indexes(&self) -> Result<()> {
        super::indexes::ensure_indexes(
            self.strategy.as_ref(),
            self.events.as_ref(),
            self.snapshots.as_ref(),
        )
        .await
    }

    /// Append one commit.
    ///
    /// A commit starting at a position that is already taken fails with
    /// [`StorageError::CommitConflict`]; the stored commit is untouched and
    /// nothing is retried.
    pub async fn append_events(
        &self,
        aggregate_type: &str,
        events: &[DomainEventMessage<P>],
    ) -> Result<()> {
        let documents = codec::create_documents(
            self.strategy.as_ref(),
            aggregate_type,
            self.serializer.as_ref(),
            events,
        )?;
        // non-empty: create_documents rejects empty commits
        let first = &events[0];

        match self.events.insert_many(documents).await {
            Ok(()) => {
                info!(
                    %aggregate_type,
                    aggregate_id = %first.aggregate_identifier,
                    first_sequence = first.sequence_number,
                    count = events.len(),
                    "Events appended"
                );
                Ok(())
            }
            Err(StoreError::DuplicateKey { index }) => {
                warn!(
                    %aggregate_type,
                    aggregate_id = %first.aggregate_identifier,
                    first_sequence = first.sequence_number,
                    %index,
                    "Commit conflict"
                );
                Err(StorageError::CommitConflict {
                    aggregate_type: aggregate_type.to_string(),
                    aggregate_id: first.aggregate_identifier.clone(),
                    first_sequence: first.sequence_number,
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Store a snapshot of an aggregate.
    pub async fn append_snapshot_event(
        &self,
        aggregate_type: &str,
        snapshot: &DomainEventMessage<P>,
    ) -> Result<()> {
        let document = codec::create_snapshot_document(
            self.strategy.as_ref(),
            aggregate_type,
            self.serializer.as_ref(),
            snapshot,
        )?;
        self.snapshots.insert_many(vec![document]).await?;
        info!(
            %aggregate_type,
            aggregate_id = %snapshot.aggregate_identifier,
            sequence = snapshot.sequence_number,
            "Snapshot stored"
        );
        Ok(())
    }

    /// Events needed to rebuild an aggregate.
    ///
    /// Starts from the latest snapshot when one exists and decodes to at
    /// least one message, followed by the events after it. Otherwise the full
    /// stream is replayed. An aggregate without events yields an empty vector.
    pub async fn read_events(
        &self,
        aggregate_type: &str,
        aggregate_identifier: &str,
    ) -> Result<Vec<DomainEventMessage<P>>> {
        if let Some(mut messages) = self
            .read_latest_snapshot(aggregate_type, aggregate_identifier)
            .await?
        {
            if let Some(last) = messages.last() {
                let next = last.sequence_number + 1;
                messages.extend(
                    self.read_events_from(aggregate_type, aggregate_identifier, next)
                        .await?,
                );
                return Ok(messages);
            }
            debug!(
                %aggregate_type,
                %aggregate_identifier,
                "Snapshot decoded to no events, replaying full stream"
            );
        }
        self.read_events_from(aggregate_type, aggregate_identifier, 0)
            .await
    }

    /// Events with sequence number at or after `first_sequence_number`.
    pub async fn read_events_from(
        &self,
        aggregate_type: &str,
        aggregate_identifier: &str,
        first_sequence_number: u64,
    ) -> Result<Vec<DomainEventMessage<P>>> {
        let stream = stream::find_events(
            self.strategy.as_ref(),
            self.events.as_ref(),
            aggregate_type,
            aggregate_identifier,
            first_sequence_number,
        );

        let mut messages = Vec::new();
        self.drain(stream, Some(aggregate_identifier), |message| {
            if message.sequence_number >= first_sequence_number {
                messages.push(message);
            }
        })
        .await?;
        Ok(messages)
    }

    /// Feed every event matching `criteria` to `visitor`, in store order.
    pub async fn visit_events<F>(&self, criteria: &Criteria, visitor: F) -> Result<()>
    where
        F: FnMut(DomainEventMessage<P>),
    {
        let stream = criteria::find_events_matching(
            self.strategy.as_ref(),
            self.events.as_ref(),
            criteria,
        )?;
        self.drain(stream, None, visitor).await
    }

    /// Decoded latest snapshot. A snapshot that cannot be decoded is logged
    /// and ignored so the aggregate is rebuilt from its events.
    async fn read_latest_snapshot(
        &self,
        aggregate_type: &str,
        aggregate_identifier: &str,
    ) -> Result<Option<Vec<DomainEventMessage<P>>>> {
        let mut stream = snapshot::find_last_snapshot(
            self.strategy.as_ref(),
            self.snapshots.as_ref(),
            aggregate_type,
            aggregate_identifier,
        );
        let latest = stream.next_document().await;
        stream.close().await;

        let Some(document) = latest? else {
            return Ok(None);
        };
        match self.decode(&document, Some(aggregate_identifier)) {
            Ok(messages) => Ok(Some(messages)),
            Err(e @ (StorageError::Deserialization { .. } | StorageError::MalformedDocument(_))) => {
                warn!(
                    %aggregate_type,
                    %aggregate_identifier,
                    error = %e,
                    "Unreadable snapshot, replaying full stream"
                );
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn decode(
        &self,
        document: &bson::Document,
        aggregate_identifier: Option<&str>,
    ) -> Result<Vec<DomainEventMessage<P>>> {
        codec::extract_event_messages(
            self.strategy.as_ref(),
            document,
            aggregate_identifier,
            self.serializer.as_ref(),
            &self.upcasters,
            self.skip_unknown_types,
        )
    }

    /// Decode every document of `stream` into `accept`. The stream is closed
    /// on every exit path.
    async fn drain<F>(
        &self,
        mut stream: DocumentStream,
        aggregate_identifier: Option<&str>,
        mut accept: F,
    ) -> Result<()>
    where
        F: FnMut(DomainEventMessage<P>),
    {
        loop {
            let document = match stream.next_document().await {
                Ok(Some(document)) => document,
                Ok(None) => break,
                Err(e) => {
                    stream.close().await;
                    return Err(e);
                }
            };
            match self.decode(&document, aggregate_identifier) {
                Ok(messages) => messages.into_iter().for_each(&mut accept),
                Err(e) => {
                    stream.close().await;
                    return Err(e);
                }
            }
        }
        stream.close().await;
        Ok(())
    }
}
