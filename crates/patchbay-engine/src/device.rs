//! In-memory device graph.
//!
//! [`OfflineDeviceGraph`] keeps units and wires in plain collections and logs
//! every operation it receives. It backs offline playback in the CLI and is
//! the recording double the engine tests assert against.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::DeviceError;
use crate::instance::{DeviceGraph, Endpoint, UnitId};

/// One call received by an [`OfflineDeviceGraph`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DeviceOp {
    /// A unit was created.
    Create(UnitId, String),
    /// A unit was destroyed.
    Destroy(UnitId),
    /// Two endpoints were wired.
    Connect(Endpoint, Endpoint),
    /// A wire was removed.
    Disconnect(Endpoint, Endpoint),
    /// The backend was asked to start.
    Start,
}

/// A device graph that only tracks topology.
#[derive(Debug, Default)]
pub struct OfflineDeviceGraph {
    next_unit: u64,
    units: BTreeMap<UnitId, String>,
    wires: BTreeSet<(Endpoint, Endpoint)>,
    ops: Vec<DeviceOp>,
    running: bool,
}

impl OfflineDeviceGraph {
    /// Creates an empty, stopped backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every operation received so far, in order.
    pub fn ops(&self) -> &[DeviceOp] {
        &self.ops
    }

    /// Clears the operation log without touching topology.
    pub fn take_ops(&mut self) -> Vec<DeviceOp> {
        std::mem::take(&mut self.ops)
    }

    /// Number of connect calls in the log.
    pub fn connect_count(&self) -> usize {
        self.ops
            .iter()
            .filter(|op| matches!(op, DeviceOp::Connect(..)))
            .count()
    }

    /// Number of disconnect calls in the log.
    pub fn disconnect_count(&self) -> usize {
        self.ops
            .iter()
            .filter(|op| matches!(op, DeviceOp::Disconnect(..)))
            .count()
    }

    /// Live wires.
    pub fn wires(&self) -> impl Iterator<Item = &(Endpoint, Endpoint)> {
        self.wires.iter()
    }

    /// Returns `true` if `output` is wired to `input`.
    pub fn is_wired(&self, output: Endpoint, input: Endpoint) -> bool {
        self.wires.contains(&(output, input))
    }

    /// Label of a live unit.
    pub fn unit_label(&self, unit: UnitId) -> Option<&str> {
        self.units.get(&unit).map(String::as_str)
    }

    /// Number of live units.
    pub fn unit_count(&self) -> usize {
        self.units.len()
    }

    /// Returns `true` once [`ensure_running`](DeviceGraph::ensure_running)
    /// has been called.
    pub fn is_running(&self) -> bool {
        self.running
    }

    fn check_unit(&self, unit: UnitId) -> Result<(), DeviceError> {
        if self.units.contains_key(&unit) {
            Ok(())
        } else {
            Err(DeviceError::UnknownUnit(unit))
        }
    }
}

impl DeviceGraph for OfflineDeviceGraph {
    fn create_unit(&mut self, label: &str) -> Result<UnitId, DeviceError> {
        let unit = UnitId(self.next_unit);
        self.next_unit += 1;
        self.units.insert(unit, label.to_owned());
        self.ops.push(DeviceOp::Create(unit, label.to_owned()));
        Ok(unit)
    }

    fn destroy_unit(&mut self, unit: UnitId) -> Result<(), DeviceError> {
        self.check_unit(unit)?;
        self.units.remove(&unit);
        self.wires
            .retain(|(out, inp)| out.unit != unit && inp.unit != unit);
        self.ops.push(DeviceOp::Destroy(unit));
        Ok(())
    }

    fn connect(&mut self, output: Endpoint, input: Endpoint) -> Result<(), DeviceError> {
        self.check_unit(output.unit)?;
        self.check_unit(input.unit)?;
        if !self.wires.insert((output, input)) {
            return Err(DeviceError::AlreadyConnected { output, input });
        }
        self.ops.push(DeviceOp::Connect(output, input));
        Ok(())
    }

    fn disconnect(&mut self, output: Endpoint, input: Endpoint) -> Result<(), DeviceError> {
        if !self.wires.remove(&(output, input)) {
            return Err(DeviceError::NotConnected { output, input });
        }
        self.ops.push(DeviceOp::Disconnect(output, input));
        Ok(())
    }

    fn ensure_running(&mut self) -> Result<(), DeviceError> {
        if !self.running {
            self.running = true;
            self.ops.push(DeviceOp::Start);
        }
        Ok(())
    }
}
