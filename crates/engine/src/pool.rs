// Bounded scoped worker pool. Items are claimed through a shared cursor so
// slow documents don't stall a whole chunk; results come back in input order.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;

use crate::error::EngineError;

pub(crate) fn map_ordered<T, R, F>(
    items: &[T],
    workers: usize,
    cancel: Option<&AtomicBool>,
    f: F,
) -> Result<Vec<R>, EngineError>
where
    T: Sync,
    R: Send,
    F: Fn(&T) -> R + Sync,
{
    if items.is_empty() {
        return Ok(Vec::new());
    }
    let workers = workers.clamp(1, items.len());
    let cancelled = || cancel.is_some_and(|c| c.load(Ordering::Relaxed));

    if workers == 1 {
        let mut out = Vec::with_capacity(items.len());
        for item in items {
            if cancelled() {
                return Err(cancelled_error());
            }
            out.push(f(item));
        }
        return Ok(out);
    }

    let cursor = AtomicUsize::new(0);
    let f = &f;
    let cursor = &cursor;
    let cancelled = &cancelled;

    let joined = thread::scope(|scope| {
        let handles: Vec<_> = (0..workers)
            .map(|_| {
                scope.spawn(move || {
                    let mut out = Vec::new();
                    loop {
                        if cancelled() {
                            break;
                        }
                        let i = cursor.fetch_add(1, Ordering::Relaxed);
                        if i >= items.len() {
                            break;
                        }
                        out.push((i, f(&items[i])));
                    }
                    out
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join()).collect::<Vec<_>>()
    });

    let mut slots: Vec<Option<R>> = (0..items.len()).map(|_| None).collect();
    for chunk in joined {
        let chunk = chunk.map_err(|_| EngineError::Worker("worker thread panicked".into()))?;
        for (i, r) in chunk {
            slots[i] = Some(r);
        }
    }

    slots
        .into_iter()
        .collect::<Option<Vec<R>>>()
        .ok_or_else(cancelled_error)
}

fn cancelled_error() -> EngineError {
    EngineError::Worker("cancelled before all items were processed".into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preserves_input_order() {
        let items: Vec<u32> = (0..1000).collect();
        let out = map_ordered(&items, 8, None, |x| x * 2).unwrap();
        assert_eq!(out, items.iter().map(|x| x * 2).collect::<Vec<_>>());
    }

    #[test]
    fn empty_input() {
        let out: Vec<u8> = map_ordered(&[] as &[u8], 4, None, |x| *x).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn cancelled_pool_reports_error() {
        let flag = AtomicBool::new(true);
        let items = vec![1, 2, 3];
        let err = map_ordered(&items, 2, Some(&flag), |x| *x).unwrap_err();
        assert_eq!(err.code(), "worker_failed");
    }

    #[test]
    fn panicking_worker_is_an_error() {
        let items = vec![1, 2, 3, 4];
        let err = map_ordered(&items, 2, None, |x| {
            if *x == 3 {
                panic!("boom");
            }
            *x
        })
        .unwrap_err();
        assert!(err.to_string().contains("panicked"));
    }
}
