// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

/*!
    # Purpose

    The *compositor* crate turns a set of per-participant recording archives
    into a single multiplexed output file. Each archive started and stopped
    at its own offsets on the session timeline; the composition produces one
    unified timeline in which participants appear and disappear at the right
    moments, dead air is collapsed away, and a configurable layout arranges
    the video sources in the output frame.

    The work splits into three subsystems:

    - The [layout planner](layout) compiles the declarative layout plus the
      source catalog into per-cell schedules and the global trim list.
    - The composition pipeline runs two producer threads
      ([`AudioProducer`], [`VideoProducer`]) whose bounded [queues](queue)
      are drained by the [muxer loop](muxer) into the output container.
    - The [interval algebra](interval) keeps audio and video timelines
      consistent while dead air is removed.

    # Codec and container surfaces

    Codecs are reached exclusively through the traits in [`codec`]
    ([`VideoDecoder`], [`AudioDecoder`], [`VideoEncoder`], [`AudioEncoder`]);
    libopus and OpenH264 adapters sit behind the `libopus` and `openh264`
    cargo features. Containers implement [`ContainerWriter`]; WebM and MP4
    (simple and faststart) writers are built in.
*/

#![allow(clippy::module_name_repetitions)]

#[macro_use]
extern crate log;

pub mod codec;
pub mod composer;
pub mod container;
pub mod error;
pub mod filler;
pub mod frame;
pub mod interval;
pub mod layout;
pub mod muxer;
pub mod pipeline;
pub mod producer;
pub mod queue;
pub mod report;
pub mod scaler;
pub mod source;
pub mod types;

pub use codec::{AudioDecoder, AudioEncoder, VideoDecoder, VideoEncoder};
pub use composer::{ComposerKind, GridComposer, ParallelGridComposer, RegionComposer};
pub use container::{ContainerFormat, ContainerWriter, Mp4Muxer};
pub use error::{Error, Result};
pub use filler::Filler;
pub use frame::{EncodedFrame, PcmBlock, YuvImage};
pub use interval::{Interval, TrimIntervals};
pub use layout::{CompiledLayout, LayoutDescription, RegionDescription, Reuse};
pub use muxer::Muxer;
pub use producer::{AudioProducer, ProducerHandle, VideoProducer};
pub use report::Reporter;
pub use scaler::FilterMode;
pub use source::{ArchiveItem, Source, SourceCatalog, SourceId, SourceKind};
pub use types::{FrameRate, Position, Resolution, Timescale};

#[cfg(test)]
mod tests;

#[cfg(test)]
pub use tests::testing;
