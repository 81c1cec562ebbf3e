//! Host parameter identifiers and the per-event parameter snapshot.
//!
//! The host names its controls with strings. Those names are translated into
//! [`ParamId`] once, when the snapshot is built, so nothing downstream compares
//! strings.

/// Every control the deployment reads from the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamId {
    RandomA,
    RandomB,
    Interpolate,
    Kick,
    Snare,
    ClosedHat,
    OpenHat,
    LowTom,
    MidTom,
    HighTom,
    Crash,
    Ride,
}

impl ParamId {
    pub const COUNT: usize = 12;

    pub const ALL: [ParamId; Self::COUNT] = [
        ParamId::RandomA,
        ParamId::RandomB,
        ParamId::Interpolate,
        ParamId::Kick,
        ParamId::Snare,
        ParamId::ClosedHat,
        ParamId::OpenHat,
        ParamId::LowTom,
        ParamId::MidTom,
        ParamId::HighTom,
        ParamId::Crash,
        ParamId::Ride,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    /// The name the host uses for this control.
    pub fn name(self) -> &'static str {
        match self {
            ParamId::RandomA => "Random A",
            ParamId::RandomB => "Random B",
            ParamId::Interpolate => "Interpolate",
            ParamId::Kick => "Kick",
            ParamId::Snare => "Snare",
            ParamId::ClosedHat => "ClosedHat",
            ParamId::OpenHat => "OpenHat",
            ParamId::LowTom => "LowTom",
            ParamId::MidTom => "MidTom",
            ParamId::HighTom => "HighTom",
            ParamId::Crash => "Crash",
            ParamId::Ride => "Ride",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|id| id.name() == name)
    }
}

/// Read access to the host's parameter state for one event.
pub trait ParameterSource {
    /// Whether a trigger button was pressed since the previous event.
    fn was_button_clicked(&self, id: ParamId) -> bool;

    /// Whether a continuous parameter was changed since the previous event.
    fn was_param_updated(&self, id: ParamId) -> bool;

    /// Current value of a parameter, if the host reported one.
    fn value_for(&self, id: ParamId) -> Option<f32>;
}

/// Parameter state captured from the host for a single event.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterSnapshot {
    clicked: [bool; ParamId::COUNT],
    updated: [bool; ParamId::COUNT],
    values: [Option<f32>; ParamId::COUNT],
}

impl ParameterSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a snapshot from host-side names. Unknown names are logged and dropped.
    pub fn from_host<'a>(
        clicked: impl IntoIterator<Item = &'a str>,
        updated: impl IntoIterator<Item = (&'a str, f32)>,
    ) -> Self {
        let mut snapshot = Self::new();
        for name in clicked {
            match ParamId::from_name(name) {
                Some(id) => snapshot.click(id),
                None => log::warn!("ignoring click on unknown button {name:?}"),
            }
        }
        for (name, value) in updated {
            match ParamId::from_name(name) {
                Some(id) => snapshot.update(id, value),
                None => log::warn!("ignoring update of unknown parameter {name:?}"),
            }
        }
        snapshot
    }

    pub fn click(&mut self, id: ParamId) {
        self.clicked[id.index()] = true;
    }

    pub fn update(&mut self, id: ParamId, value: f32) {
        self.updated[id.index()] = true;
        self.values[id.index()] = Some(value);
    }
}

#[cfg(test)]
impl ParameterSnapshot {
    pub fn is_empty(&self) -> bool {
        !self.clicked.iter().chain(self.updated.iter()).any(|&flag| flag)
    }

    pub fn with_click(mut self, id: ParamId) -> Self {
        self.click(id);
        self
    }

    pub fn with_update(mut self, id: ParamId, value: f32) -> Self {
        self.update(id, value);
        self
    }
}

impl ParameterSource for ParameterSnapshot {
    fn was_button_clicked(&self, id: ParamId) -> bool {
        self.clicked[id.index()]
    }

    fn was_param_updated(&self, id: ParamId) -> bool {
        self.updated[id.index()]
    }

    fn value_for(&self, id: ParamId) -> Option<f32> {
        self.values[id.index()]
    }
}
