//! Simulated network traffic.
//!
//! Each producer thread plays a network I/O thread: it serializes player
//! updates, frames them as they would go on the wire, parses the frame back
//! as a receiver would and hands the message to the dispatcher. Handlers run
//! on the executor thread and check what they receive.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::Context;
use darkrift::{
    DarkRiftReader, DarkRiftSerializable, DarkRiftWriter, Dispatcher, Message, MessageBuffer,
    ObjectCache, ReadError,
};
use tracing::{debug, info};

use crate::config::WorkloadSettings;

/// Tag carried by every player update.
pub const PLAYER_UPDATE_TAG: u16 = 0x0101;

/// A movement update as a game client would send it.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerUpdate {
    pub player_id: u32,
    pub sequence: u32,
    pub position: [f32; 3],
    pub name: String,
}

impl PlayerUpdate {
    fn generate(player_id: u32, sequence: u32) -> Self {
        let step = sequence as f32;
        Self {
            player_id,
            sequence,
            position: [step, step * 0.5, -step],
            name: format!("player-{player_id}"),
        }
    }
}

impl DarkRiftSerializable for PlayerUpdate {
    fn serialize(&self, writer: &mut DarkRiftWriter) {
        writer.write_u32(self.player_id);
        writer.write_u32(self.sequence);
        writer.write_f32s(&self.position);
        writer.write_string(&self.name);
    }

    fn deserialize(reader: &mut DarkRiftReader<'_>) -> Result<Self, ReadError> {
        let player_id = reader.read_u32()?;
        let sequence = reader.read_u32()?;
        let position: [f32; 3] = reader
            .read_f32s()?
            .try_into()
            .map_err(|values: Vec<f32>| {
                ReadError::custom(format!("expected 3 coordinates, got {}", values.len()))
            })?;
        let name = reader.read_string()?;
        Ok(Self { player_id, sequence, position, name })
    }
}

#[derive(Debug, Default)]
struct Counters {
    sent: AtomicU64,
    handled: AtomicU64,
    pings: AtomicU64,
    framed_bytes: AtomicU64,
}

/// Totals for a finished run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkloadReport {
    pub sent: u64,
    pub handled: u64,
    pub pings: u64,
    pub framed_bytes: u64,
    pub elapsed: Duration,
}

impl WorkloadReport {
    pub fn messages_per_second(&self) -> f64 {
        let seconds = self.elapsed.as_secs_f64();
        if seconds == 0.0 {
            0.0
        } else {
            self.handled as f64 / seconds
        }
    }
}

/// Producer threads feeding a dispatcher.
pub struct Workload {
    producers: Vec<JoinHandle<anyhow::Result<()>>>,
    counters: Arc<Counters>,
    stop: Arc<AtomicBool>,
    started: Instant,
}

impl Workload {
    /// Spawns the producer threads. They start sending immediately.
    pub fn start(
        settings: &WorkloadSettings,
        cache: &ObjectCache,
        dispatcher: Arc<Dispatcher>,
    ) -> anyhow::Result<Self> {
        let counters = Arc::new(Counters::default());
        let stop = Arc::new(AtomicBool::new(false));

        let producers = (0..settings.producer_threads)
            .map(|index| {
                let producer = Producer {
                    player_id: index as u32,
                    messages: settings.messages_per_producer,
                    ping_every: settings.ping_every,
                    cache: cache.clone(),
                    dispatcher: dispatcher.clone(),
                    counters: counters.clone(),
                    stop: stop.clone(),
                };
                thread::Builder::new()
                    .name(format!("producer-{index}"))
                    .spawn(move || producer.run())
                    .context("failed to spawn producer thread")
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        info!("🚚 Started {} producer threads", producers.len());

        Ok(Self {
            producers,
            counters,
            stop,
            started: Instant::now(),
        })
    }

    /// Whether every producer has stopped sending.
    pub fn is_finished(&self) -> bool {
        self.producers.iter().all(|producer| producer.is_finished())
    }

    /// Asks producers to stop after their current message.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    /// Messages handed to the dispatcher so far.
    pub fn sent(&self) -> u64 {
        self.counters.sent.load(Ordering::Relaxed)
    }

    /// Messages whose handler has run successfully so far.
    pub fn handled(&self) -> u64 {
        self.counters.handled.load(Ordering::Relaxed)
    }

    /// Waits for every producer and totals the run. Handlers still queued on
    /// the dispatcher are not counted, so drain it first.
    pub fn join(self) -> anyhow::Result<WorkloadReport> {
        for producer in self.producers {
            producer
                .join()
                .map_err(|_| anyhow::anyhow!("producer thread panicked"))??;
        }

        Ok(WorkloadReport {
            sent: self.counters.sent.load(Ordering::Relaxed),
            handled: self.counters.handled.load(Ordering::Relaxed),
            pings: self.counters.pings.load(Ordering::Relaxed),
            framed_bytes: self.counters.framed_bytes.load(Ordering::Relaxed),
            elapsed: self.started.elapsed(),
        })
    }
}

struct Producer {
    player_id: u32,
    messages: u32,
    ping_every: u32,
    cache: ObjectCache,
    dispatcher: Arc<Dispatcher>,
    counters: Arc<Counters>,
    stop: Arc<AtomicBool>,
}

impl Producer {
    fn run(self) -> anyhow::Result<()> {
        for sequence in 0..self.messages {
            if self.stop.load(Ordering::Relaxed) {
                debug!(player_id = self.player_id, sequence, "🛑 Producer stopping early");
                break;
            }

            let update = PlayerUpdate::generate(self.player_id, sequence);
            let mut message = Message::create_from(&self.cache, PLAYER_UPDATE_TAG, &update);
            if self.ping_every > 0 && sequence % self.ping_every == 0 {
                message.make_ping_message();
                self.counters.pings.fetch_add(1, Ordering::Relaxed);
            }

            // What the socket would carry, then what the receiving side sees
            let framed = message.to_buffer();
            self.counters
                .framed_bytes
                .fetch_add(framed.count() as u64, Ordering::Relaxed);
            let received = Message::from_buffer(MessageBuffer::from_slice(
                &self.cache,
                framed.as_slice(),
            ))?;

            let counters = self.counters.clone();
            let player_id = self.player_id;
            let task = self.dispatcher.invoke_async(move || {
                handle_update(&received, player_id, sequence)?;
                counters.handled.fetch_add(1, Ordering::Relaxed);
                Ok(())
            });
            drop(task);
            self.counters.sent.fetch_add(1, Ordering::Relaxed);
        }
        Ok(())
    }
}

fn handle_update(message: &Message, player_id: u32, sequence: u32) -> anyhow::Result<()> {
    anyhow::ensure!(
        message.tag() == PLAYER_UPDATE_TAG,
        "unexpected tag {:#06x}",
        message.tag()
    );

    let update: PlayerUpdate = message.deserialize()?;
    anyhow::ensure!(
        update == PlayerUpdate::generate(player_id, sequence),
        "update from player {player_id} #{sequence} arrived corrupted: {update:?}"
    );
    Ok(())
}
