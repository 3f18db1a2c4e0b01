/// The event types this pipeline stores. Anything else (door events,
/// light-priority requests, …) carries nothing we persist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VehicleStatus {
    Driving,
    Arriving,
    ArrivedWithinRadius,
    Departing,
    ArrivedAtStop,
    ReadyToDepart,
    Waiting,
    ScheduleOffset,
    StartTime,
}

impl VehicleStatus {
    /// Classifies a lower-case event type code, returning `None` for codes
    /// the pipeline ignores.
    pub fn classify(event_type: &str) -> Option<Self> {
        match event_type {
            "vp" => Some(Self::Driving),
            "due" => Some(Self::Arriving),
            "arr" => Some(Self::ArrivedWithinRadius),
            "dep" => Some(Self::Departing),
            "ars" => Some(Self::ArrivedAtStop),
            "pde" => Some(Self::ReadyToDepart),
            "wait" => Some(Self::Waiting),
            "dl" => Some(Self::ScheduleOffset),
            "start" => Some(Self::StartTime),
            _ => None,
        }
    }

    /// Human-readable status stored on the stop event.
    pub fn label(self) -> &'static str {
        match self {
            Self::Driving => "Driving",
            Self::Arriving => "Arriving to a stop",
            Self::ArrivedWithinRadius => "Arrives inside of a stop radius",
            Self::Departing => "Departing from stop",
            Self::ArrivedAtStop => "Arrived to a stop",
            Self::ReadyToDepart => "Ready to depart from a stop",
            Self::Waiting => "Waiting at a stop",
            Self::ScheduleOffset => "Time offset from schedule",
            Self::StartTime => "Start time",
        }
    }

    /// Every status except plain driving carries an arrival time.
    pub fn needs_arrival_time(self) -> bool {
        self != Self::Driving
    }
}
