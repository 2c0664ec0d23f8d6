use chrono::{Local, NaiveDate, NaiveDateTime};

/// Source of local wall-clock time. Timers and daily buckets are computed
/// from it, so tests can substitute a clock they control.
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;

    fn today(&self) -> NaiveDate {
        self.now().date()
    }
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

#[cfg(test)]
pub mod test_support {
    use super::Clock;
    use chrono::{Duration, NaiveDateTime};
    use std::sync::Mutex;

    /// A clock that only moves when told to
    pub struct ManualClock(Mutex<NaiveDateTime>);

    impl ManualClock {
        pub fn new(start: NaiveDateTime) -> Self {
            Self(Mutex::new(start))
        }

        pub fn advance(&self, seconds: i64) {
            let mut now = self.0.lock().unwrap();
            *now += Duration::seconds(seconds);
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> NaiveDateTime {
            *self.0.lock().unwrap()
        }
    }
}
