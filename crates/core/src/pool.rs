use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

#[derive(Debug)]
pub(crate) enum JobOutcome<T> {
    Completed(T),
    Panicked(String),
    TimedOut,
}

/// Runs the named jobs on a bounded pool of worker threads and collects
/// outcomes in completion order, waiting at most `per_job_timeout` between
/// completions. Jobs still outstanding when the wait expires are reported
/// `TimedOut` and their workers are abandoned rather than joined, so a hung
/// probe never blocks the caller.
pub(crate) fn run_jobs<T>(
    jobs: Vec<(String, Box<dyn FnOnce() -> T + Send>)>,
    workers: usize,
    per_job_timeout: Duration,
) -> Vec<(String, JobOutcome<T>)>
where
    T: Send + 'static,
{
    let total = jobs.len();
    if total == 0 {
        return Vec::new();
    }
    let workers = workers.max(1).min(total);

    let (job_tx, job_rx) = mpsc::channel();
    let job_rx = Arc::new(Mutex::new(job_rx));
    let (result_tx, result_rx) = mpsc::channel();

    let mut names = Vec::with_capacity(total);
    for (index, (name, run)) in jobs.into_iter().enumerate() {
        names.push(name);
        let _ = job_tx.send((index, run));
    }
    drop(job_tx);

    for _ in 0..workers {
        let job_rx = Arc::clone(&job_rx);
        let result_tx = result_tx.clone();
        thread::spawn(move || loop {
            let (index, run) = {
                let Ok(queue) = job_rx.lock() else {
                    break;
                };
                match queue.recv() {
                    Ok(job) => job,
                    Err(_) => break,
                }
            };
            let outcome = match catch_unwind(AssertUnwindSafe(run)) {
                Ok(value) => JobOutcome::Completed(value),
                Err(payload) => JobOutcome::Panicked(panic_message(payload)),
            };
            if result_tx.send((index, outcome)).is_err() {
                break;
            }
        });
    }
    drop(result_tx);

    let mut seen = vec![false; total];
    let mut collected = Vec::with_capacity(total);
    while collected.len() < total {
        match result_rx.recv_timeout(per_job_timeout) {
            Ok((index, outcome)) => {
                if !seen[index] {
                    seen[index] = true;
                    collected.push((index, outcome));
                }
            }
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    for (index, done) in seen.iter().enumerate() {
        if !done {
            collected.push((index, JobOutcome::TimedOut));
        }
    }

    collected
        .into_iter()
        .map(|(index, outcome)| (names[index].clone(), outcome))
        .collect()
}

pub(crate) fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "probe panicked".to_string()
    }
}
