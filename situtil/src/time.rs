use std::time::Instant;

use log::info;

pub fn elapsed_seconds(since: Instant) -> f64 {
    let dt = since.elapsed();
    (dt.as_secs() as f64) + (f64::from(dt.subsec_nanos()) * 1e-9)
}

/// Hierarchical stopwatch for instrumenting a pipeline. Stages nest; when one
/// finishes, how long it took is logged, indented by nesting depth.
pub struct Timer {
    outermost_name: String,
    stack: Vec<(String, Instant)>,
}

impl Timer {
    pub fn new<S: Into<String>>(name: S) -> Timer {
        let name = name.into();
        Timer {
            outermost_name: name.clone(),
            stack: vec![(name, Instant::now())],
        }
    }

    pub fn start<S: Into<String>>(&mut self, name: S) {
        self.stack.push((name.into(), Instant::now()));
    }

    pub fn stop<S: Into<String>>(&mut self, name: S) {
        let name = name.into();
        let (top, started) = self
            .stack
            .pop()
            .unwrap_or_else(|| panic!("stop({}) called with nothing started", name));
        assert_eq!(top, name, "stop({}) doesn't match start({})", name, top);
        info!(
            "{}{} took {:.2}s",
            "  ".repeat(self.stack.len().saturating_sub(1)),
            name,
            elapsed_seconds(started)
        );
    }

    /// Log a note tied to the current stage.
    pub fn note<S: Into<String>>(&mut self, msg: S) {
        info!("{}- {}", "  ".repeat(self.stack.len()), msg.into());
    }

    /// Finish the outermost stage. All nested stages must already be stopped.
    pub fn done(mut self) {
        assert_eq!(
            self.stack.len(),
            1,
            "Timer done() called with unstopped stages: {:?}",
            self.stack.iter().map(|(n, _)| n.clone()).collect::<Vec<_>>()
        );
        let (name, started) = self.stack.pop().unwrap();
        assert_eq!(name, self.outermost_name);
        info!("{} took {:.2}s", name, elapsed_seconds(started));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nesting() {
        let mut timer = Timer::new("outer");
        timer.start("inner");
        timer.start("innermost");
        timer.stop("innermost");
        timer.stop("inner");
        timer.done();
    }

    #[test]
    #[should_panic]
    fn test_mismatched_stop() {
        let mut timer = Timer::new("outer");
        timer.start("a");
        timer.stop("b");
    }
}
