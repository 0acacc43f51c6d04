//! Demo simulation host
//!
//! Stands in for the simulator's physical layer: every tick it queries the
//! channel once per receiver with all devices transmitting, and logs every
//! attenuation that changed since the previous tick.

use std::thread;
use std::time::Duration;

use att_channel::{AttenuationChannel, ChannelError};
use tracing::{debug, info};

/// Parameters of a demo run
#[derive(Debug, Clone)]
pub struct HostOptions {
    pub num_devices: usize,
    /// Stop after this many ticks; 0 runs until an error
    pub ticks: u64,
    pub tick: Duration,
    /// Receiver to query; `None` queries every device
    pub rx_device: Option<usize>,
}

/// Latest attenuations seen by the host, `seen[rx][tx]`
pub struct DemoHost {
    options: HostOptions,
    seen: Vec<Vec<Option<f64>>>,
}

impl DemoHost {
    pub fn new(options: HostOptions) -> Self {
        let n = options.num_devices;
        Self {
            options,
            seen: vec![vec![None; n]; n],
        }
    }

    /// Run ticks until the configured count is reached or the channel fails
    pub fn run(&mut self, channel: &mut dyn AttenuationChannel) -> Result<u64, ChannelError> {
        let mut tick = 0;
        while self.options.ticks == 0 || tick < self.options.ticks {
            let changed = self.step(channel)?;
            if changed > 0 {
                debug!("Tick {}: {} attenuations changed", tick, changed);
            }
            tick += 1;
            thread::sleep(self.options.tick);
        }
        Ok(tick)
    }

    /// Query every selected receiver once; returns the number of changes
    pub fn step(&mut self, channel: &mut dyn AttenuationChannel) -> Result<usize, ChannelError> {
        let n = self.options.num_devices;
        let tx_active = vec![true; n];
        let mut att = vec![0.0; n];

        let receivers = match self.options.rx_device {
            Some(rx) => rx..rx + 1,
            None => 0..n,
        };

        let mut changed = 0;
        for rx in receivers {
            channel.calc(&tx_active, rx, &mut att)?;
            for (tx, &value) in att.iter().enumerate() {
                if tx == rx {
                    continue;
                }
                let previous = self.seen[rx][tx].replace(value);
                match previous {
                    Some(old) if old == value => {}
                    Some(old) => {
                        info!("{} -> {}: {:.1} dB -> {:.1} dB", tx, rx, old, value);
                        changed += 1;
                    }
                    None => debug!("{} -> {}: {:.1} dB", tx, rx, value),
                }
            }
        }
        Ok(changed)
    }

    /// Last attenuation seen from `tx` at `rx`
    pub fn seen(&self, tx: usize, rx: usize) -> Option<f64> {
        self.seen.get(rx).and_then(|row| row.get(tx)).copied().flatten()
    }
}
