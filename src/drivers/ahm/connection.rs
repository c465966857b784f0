//! AHM connection management and inbound dispatch
//!
//! Owns the TCP socket lifecycle. One reader task decodes inbound buffers in
//! arrival order and applies them to the mirror; one writer task drains an
//! ordered queue of outbound frames. Every connect bumps a generation counter
//! so work left over from an older socket never touches a newer one.

use anyhow::{anyhow, Result};
use std::sync::atomic::Ordering;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, error, info, trace, warn};

use super::driver::AhmDriver;
use super::poller::{encode_plan, readout_plan, refresh_plan, run_paced, FrameSink, RequestPacer};
use crate::config::AppConfig;
use crate::dbu::{format_dbu, translate_level};
use crate::feedback::{level_variable_name, level_variable_value, FeedbackKind};
use crate::protocol::{format_hex, DeviceEvent, Frame, Request};
use crate::state::StateChange;
use crate::status::ConnectionState;

const READ_BUFFER_SIZE: usize = 1024;

impl AhmDriver {
    /// Connect to the configured processor
    ///
    /// Any existing socket is torn down first. With no host configured the
    /// driver stays disconnected. On success the full readout starts in the
    /// background.
    pub async fn connect(&self) -> Result<()> {
        self.teardown("Reconnecting");

        let config = self.config();
        if !config.device.is_configured() {
            self.set_state(ConnectionState::Disconnected, "No host configured");
            return Ok(());
        }

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let addr = config.device.address();

        info!("Connecting to AHM ({}) at {}", config.device.unit, addr);
        self.set_state(ConnectionState::Connecting, format!("Connecting to {}", addr));

        let connect = tokio::time::timeout(config.poll.connect_timeout(), TcpStream::connect(&addr));
        let stream = match connect.await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                let message = format!("Failed to connect to {}: {}", addr, e);
                self.fail(generation, message.clone());
                return Err(anyhow!(message));
            }
            Err(_) => {
                let message = format!(
                    "Timed out connecting to {} after {:?}",
                    addr,
                    config.poll.connect_timeout()
                );
                self.fail(generation, message.clone());
                return Err(anyhow!(message));
            }
        };

        if self.generation.load(Ordering::SeqCst) != generation {
            debug!("Connection to {} superseded before it completed", addr);
            return Ok(());
        }

        if let Err(e) = stream.set_nodelay(true) {
            warn!("Failed to set TCP_NODELAY: {}", e);
        }

        let (read_half, write_half) = stream.into_split();
        let (tx, rx) = mpsc::unbounded_channel();
        *self.writer.lock() = Some(tx);
        self.set_state(ConnectionState::Connected, format!("Connected to {}", addr));
        info!("✅ AHM connected at {}", addr);

        let writer = self.clone_for_task();
        let writer_task = tokio::spawn(async move {
            writer.run_writer(write_half, rx, generation).await;
        });
        let reader = self.clone_for_task();
        let reader_task = tokio::spawn(async move {
            reader.run_reader(read_half, generation).await;
        });
        self.tasks.lock().extend([writer_task, reader_task]);

        self.start_readout(generation);

        if let Some(interval) = config.poll.interval() {
            let poller = self.clone_for_task();
            let periodic = tokio::spawn(async move {
                poller.run_periodic_refresh(interval, generation).await;
            });
            self.tasks.lock().push(periodic);
        }

        Ok(())
    }

    /// Close the socket (if any) and move to Disconnected
    pub fn teardown(&self, reason: &str) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        let had_socket = self.close_socket();

        if self.connection_state() != ConnectionState::Disconnected || had_socket {
            info!("AHM disconnected: {}", reason);
            self.set_state(ConnectionState::Disconnected, reason);
        }
    }

    /// Apply a new configuration
    ///
    /// Device changes (host, port, unit) reset the mirror and reconnect.
    /// Pacing and monitoring changes take effect on the next poll cycle. An
    /// unchanged device reconnects if the connection is down.
    pub async fn reconfigure(&self, new_config: AppConfig) -> Result<()> {
        let (reconnect, old_monitored) = {
            let current = self.config.read();
            (current.requires_reconnect(&new_config), current.monitored.clone())
        };

        {
            let mut monitored = self.monitored.write();
            for entry in &old_monitored {
                monitored.unsubscribe(entry);
            }
            for entry in &new_config.monitored {
                monitored.subscribe(*entry);
            }
        }

        let unit = new_config.device.unit.unit();
        let configured = new_config.device.is_configured();
        *self.config.write() = new_config;

        if !reconnect {
            // Re-applying the configuration is the retry path after a failure
            let state = self.connection_state();
            if configured && matches!(state, ConnectionState::Failed | ConnectionState::Disconnected) {
                info!("Re-applied configuration, reconnecting");
                return self.connect().await;
            }
            debug!("Configuration change does not affect the connection");
            return Ok(());
        }

        self.teardown("Reconfiguring");
        self.state.lock().reset(unit);
        debug!("Device state reset for {} inputs / {} zones", unit.inputs, unit.zones);

        self.connect().await
    }

    /// Write frames in order if connected; otherwise drop them
    ///
    /// Returns the number of frames queued. Nothing is held for later.
    pub fn send_frames(&self, frames: Vec<Frame>) -> usize {
        let writer = self.writer.lock();
        let tx = match (&*writer, self.is_connected()) {
            (Some(tx), true) => tx,
            _ => {
                debug!("Not connected, dropping {} frame(s)", frames.len());
                return 0;
            }
        };

        let mut queued = 0;
        for frame in frames {
            if tx.send(frame).is_err() {
                debug!("Writer closed, dropping remaining frames");
                break;
            }
            queued += 1;
        }
        queued
    }

    /// Encode and send a single request
    pub fn send_request(&self, request: Request) -> bool {
        match request.encode() {
            Ok(frame) => self.send_frames(vec![frame]) == 1,
            Err(e) => {
                debug!("Dropping request {}: {}", request, e);
                false
            }
        }
    }

    /// Start a full readout for the current connection
    ///
    /// Skipped if one is already running.
    pub fn refresh(&self) -> bool {
        if !self.is_connected() {
            debug!("Refresh requested while not connected");
            return false;
        }
        self.start_readout(self.generation.load(Ordering::SeqCst))
    }

    fn start_readout(&self, generation: u64) -> bool {
        if self.readout_running.swap(true, Ordering::SeqCst) {
            debug!("Readout already in progress");
            return false;
        }

        let driver = self.clone_for_task();
        let readout = tokio::spawn(async move {
            driver.run_readout(generation).await;
            if driver.generation.load(Ordering::SeqCst) == generation {
                driver.readout_running.store(false, Ordering::SeqCst);
            }
        });
        self.tasks.lock().push(readout);
        true
    }

    async fn run_readout(&self, generation: u64) {
        let plan = {
            let unit = self.state.lock().unit();
            let monitored = self.monitored.read();
            readout_plan(unit, &monitored)
        };
        let frames = encode_plan(&plan);
        let pacer = RequestPacer::new(self.config.read().poll.request_delay());

        info!("Reading out device state ({} requests)", frames.len());
        let sent = run_paced(frames, self, &pacer, || self.is_current(generation)).await;
        debug!("Readout finished: {} requests sent", sent);
    }

    async fn run_periodic_refresh(&self, interval: std::time::Duration, generation: u64) {
        loop {
            tokio::time::sleep(interval).await;
            if !self.is_current(generation) {
                break;
            }
            if self.readout_running.load(Ordering::SeqCst) {
                trace!("Skipping refresh cycle during readout");
                continue;
            }

            let frames = encode_plan(&refresh_plan(&self.monitored.read()));
            if frames.is_empty() {
                continue;
            }
            let pacer = RequestPacer::new(self.config.read().poll.request_delay());
            trace!("Refreshing {} monitored feedback(s)", frames.len());
            run_paced(frames, self, &pacer, || self.is_current(generation)).await;
        }
    }

    async fn run_writer(
        &self,
        mut write_half: OwnedWriteHalf,
        mut rx: mpsc::UnboundedReceiver<Frame>,
        generation: u64,
    ) {
        while let Some(frame) = rx.recv().await {
            trace!("TX -> {}", frame);
            if let Err(e) = write_half.write_all(frame.as_bytes()).await {
                self.fail(generation, format!("Write failed: {}", e));
                return;
            }
        }
        let _ = write_half.shutdown().await;
    }

    async fn run_reader(&self, mut read_half: OwnedReadHalf, generation: u64) {
        let mut buf = vec![0u8; READ_BUFFER_SIZE];
        loop {
            match read_half.read(&mut buf).await {
                Ok(0) => {
                    self.fail(generation, "Connection closed by device".to_string());
                    return;
                }
                Ok(n) => {
                    if self.generation.load(Ordering::SeqCst) != generation {
                        return;
                    }
                    self.handle_inbound(&buf[..n]);
                }
                Err(e) => {
                    self.fail(generation, format!("Read failed: {}", e));
                    return;
                }
            }
        }
    }

    /// Decode one inbound buffer and apply it to the mirror
    pub fn handle_inbound(&self, data: &[u8]) {
        trace!("RX <- {}", format_hex(data));

        let (event, rest) = match DeviceEvent::parse_with_rest(data) {
            Some(decoded) => decoded,
            None => {
                trace!("Ignoring unrecognized frame ({} bytes)", data.len());
                return;
            }
        };
        debug!("Device event: {}", event);
        if !rest.is_empty() {
            trace!("{} byte(s) after {} not decoded: {}", rest.len(), event, format_hex(rest));
        }

        let change = self.state.lock().apply_event(&event);
        if let Some(change) = change {
            self.publish_change(change);
        }
    }

    fn publish_change(&self, change: StateChange) {
        if let Some(kind) = FeedbackKind::for_change(&change) {
            self.check_feedbacks(kind);
            return;
        }

        if let StateChange::Level {
            ch_type,
            channel,
            level,
        } = change
        {
            match translate_level(level as i64) {
                Ok(dbu) => {
                    let name = level_variable_name(ch_type, channel);
                    trace!("{} = {} dBu", name, format_dbu(dbu));
                    self.set_variable(name, level_variable_value(dbu));
                }
                Err(e) => debug!("Not publishing {} {} level: {}", ch_type, channel, e),
            }
        }
    }

    /// Transport failure on the connection started under `generation`
    fn fail(&self, generation: u64, message: String) {
        if self.generation.load(Ordering::SeqCst) != generation {
            return;
        }
        error!("AHM connection error: {}", message);
        self.close_socket();
        self.set_state(ConnectionState::Failed, message);
    }

    /// Drop the writer queue and stop socket tasks; returns whether one was open
    fn close_socket(&self) -> bool {
        let had_writer = self.writer.lock().take().is_some();
        let tasks: Vec<_> = self.tasks.lock().drain(..).collect();
        for task in &tasks {
            task.abort();
        }
        self.readout_running.store(false, Ordering::SeqCst);
        had_writer
    }
}

impl FrameSink for AhmDriver {
    fn send_frame(&self, frame: Frame) -> bool {
        self.send_frames(vec![frame]) == 1
    }
}
