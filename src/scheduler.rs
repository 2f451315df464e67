use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TrainTrigger {
    Initial,
    Retrain,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct CalibrationState {
    pub trained: bool,
    pub ticks_since_retrain: u64,
    pub total_ticks: u64,
}

#[derive(Debug, Clone)]
pub struct CalibrationScheduler {
    num_train_initial: u64,
    num_test: u64,
    state: CalibrationState,
}

impl CalibrationScheduler {
    pub fn new(num_train_initial: usize, num_test: usize) -> Self {
        Self {
            num_train_initial: num_train_initial as u64,
            num_test: num_test as u64,
            state: CalibrationState::default(),
        }
    }

    // Counts every tick, including ones whose prices never reach the window.
    pub fn record_tick(&mut self) {
        self.state.ticks_since_retrain += 1;
        self.state.total_ticks += 1;
    }

    pub fn due(&self, flat: bool) -> Option<TrainTrigger> {
        if !self.state.trained {
            if self.state.ticks_since_retrain >= self.num_train_initial {
                return Some(TrainTrigger::Initial);
            }
            return None;
        }
        if self.state.ticks_since_retrain >= self.num_test && flat {
            return Some(TrainTrigger::Retrain);
        }
        None
    }

    pub fn mark_trained(&mut self) {
        self.state.trained = true;
        self.state.ticks_since_retrain = 0;
    }

    pub fn state(&self) -> CalibrationState {
        self.state
    }
}
