//! # Tap Driver
//!
//! Ties the pieces together for the two run modes of the tap:
//!
//! - **Discover**: builds a catalog from every available stream's schema.
//! - **Sync**: for each selected catalog entry, writes the SCHEMA message, runs
//!   the polling engine with a watermark loaded from state and a fresh
//!   `SeenIds`, then stores the new bookmark and writes STATE.
//!
//! STATE is only written after a stream finished without error, so an aborted
//! run never persists a partial watermark.

use std::io::Write;

use crate::configs::TapConfig;
use crate::errors::TapError;
use crate::retrieve::ApiClient;
use crate::singer::catalog::build_metadata;
use crate::singer::{Catalog, CatalogEntry, Message, MessageWriter, State};
use crate::streams::{CallsStream, PollingEngine, SeenIds, Stream, Watermark};

/// Every stream the tap can extract.
pub fn available_streams() -> Result<Vec<Box<dyn Stream>>, TapError> {
    Ok(vec![Box::new(CallsStream::new()?)])
}

/// Builds the discovery catalog.
pub fn discover() -> Result<Catalog, TapError> {
    let streams = available_streams()?
        .into_iter()
        .map(|stream| {
            let key_properties = stream.key_properties();
            CatalogEntry {
                tap_stream_id: stream.tap_stream_id().to_string(),
                stream: stream.tap_stream_id().to_string(),
                schema: stream.schema().clone(),
                metadata: build_metadata(stream.tap_stream_id(), stream.schema(), &key_properties),
                key_properties,
            }
        })
        .collect();
    Ok(Catalog { streams })
}

/// An engine talking to the API described by `config`.
pub fn build_engine(config: &TapConfig) -> Result<PollingEngine, TapError> {
    let client = ApiClient::new(
        &config.base_url,
        Some(config.api_key.clone()),
        &config.user_agent,
        config.request_timeout(),
    )?;
    Ok(PollingEngine::new(client))
}

/// Runs sync mode against the API described by `config`.
pub async fn run_sync<W: Write>(
    config: &TapConfig,
    state: State,
    catalog: &Catalog,
    writer: &mut MessageWriter<W>,
) -> Result<State, TapError> {
    let engine = build_engine(config)?;
    sync_streams(&engine, config, state, catalog, writer).await
}

/// Syncs every selected stream of `catalog` with `engine` and returns the final state.
pub async fn sync_streams<W: Write>(
    engine: &PollingEngine,
    config: &TapConfig,
    mut state: State,
    catalog: &Catalog,
    writer: &mut MessageWriter<W>,
) -> Result<State, TapError> {
    let streams = available_streams()?;
    log::info!("Syncing against {}", engine.client().base_url());

    for entry in catalog.streams.iter().filter(|e| !e.is_selected()) {
        log::info!("Skipping stream: {}", entry.tap_stream_id);
    }

    for entry in catalog.selected_streams() {
        let Some(stream) = streams.iter().find(|s| s.tap_stream_id() == entry.tap_stream_id) else {
            log::warn!("Unknown stream in catalog: {}", entry.tap_stream_id);
            continue;
        };

        log::info!("Syncing stream: {}", entry.tap_stream_id);
        sync_stream(engine, config, &mut state, entry, stream.as_ref(), writer).await?;
    }

    Ok(state)
}

async fn sync_stream<W: Write>(
    engine: &PollingEngine,
    config: &TapConfig,
    state: &mut State,
    entry: &CatalogEntry,
    stream: &dyn Stream,
    writer: &mut MessageWriter<W>,
) -> Result<(), TapError> {
    let stream_id = stream.tap_stream_id();
    let bookmark_field = stream.bookmark_field();

    let mut watermark = match bookmark_field {
        Some(field) => Watermark::from_state(state, stream_id, field, &config.start_date).map_err(|source| {
            TapError::Bookmark {
                stream: stream_id.to_string(),
                source,
            }
        })?,
        None => Watermark::new(None),
    };
    let mut seen = SeenIds::new();

    writer.write_message(&Message::Schema {
        stream: entry.stream.clone(),
        schema: stream.schema().clone(),
        key_properties: stream.key_properties(),
        bookmark_properties: bookmark_field.map(|f| vec![f.to_string()]).unwrap_or_default(),
    })?;

    let summary = engine
        .sync(stream, &mut watermark, &mut seen, &entry.stream_metadata(), writer)
        .await?;
    log::debug!("{} sync summary: {:?}", stream_id, summary);

    if let (Some(field), Some(next)) = (bookmark_field, watermark.next_bookmark()) {
        state.write_bookmark(stream_id, field, next);
    }
    writer.write_message(&Message::State {
        value: state.as_value().clone(),
    })?;
    Ok(())
}
