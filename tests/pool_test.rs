//! Integration tests for the worker pool: parallelism, timed admission,
//! ordering, failure isolation, shutdown.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use quotebot::Error;
use quotebot::pool::Pool;
use tokio::sync::Barrier;

// ---------------------------------------------------------------------------
// Construction
// ---------------------------------------------------------------------------

#[tokio::test]
async fn zero_concurrency_is_rejected() {
    assert!(matches!(
        Pool::<()>::new(0),
        Err(Error::InvalidPoolSize(0))
    ));
}

#[tokio::test]
async fn size_reports_construction_concurrency() {
    let pool = Pool::<()>::new(3).unwrap();
    assert_eq!(pool.size(), 3);
}

// ---------------------------------------------------------------------------
// Parallelism
// ---------------------------------------------------------------------------

#[tokio::test]
async fn all_workers_execute_in_parallel() {
    let pool = Arc::new(Pool::<()>::new(4).unwrap());
    pool.run();

    // Each task parks on a shared barrier: unless all 4 are executing at
    // the same time, nobody ever gets past it.
    let barrier = Arc::new(Barrier::new(4));
    let mut submissions = Vec::new();
    for _ in 0..4 {
        let pool = Arc::clone(&pool);
        let barrier = Arc::clone(&barrier);
        submissions.push(tokio::spawn(async move {
            pool.submit(async move {
                barrier.wait().await;
            })
            .await
        }));
    }

    let results = tokio::time::timeout(
        Duration::from_secs(5),
        futures::future::join_all(submissions),
    )
    .await
    .expect("tasks did not all run in parallel");

    for result in results {
        assert!(result.unwrap().is_ok());
    }
}

// ---------------------------------------------------------------------------
// Timed admission
// ---------------------------------------------------------------------------

#[tokio::test]
async fn saturated_pool_rejects_timed_submission_unexecuted() {
    let pool = Arc::new(Pool::<()>::new(2).unwrap());
    pool.run();

    // Occupy both workers.
    let mut busy = Vec::new();
    for _ in 0..2 {
        let pool = Arc::clone(&pool);
        busy.push(tokio::spawn(async move {
            pool.submit(async {
                tokio::time::sleep(Duration::from_millis(300)).await;
            })
            .await
        }));
    }
    tokio::time::sleep(Duration::from_millis(50)).await;

    let ran = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&ran);
    let result = pool
        .submit_timed(
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            },
            Duration::from_millis(50),
        )
        .await;

    assert!(matches!(result, Err(Error::JobTimedOut)));

    // Let everything in flight settle, then check the rejected task really
    // never ran.
    for handle in busy {
        handle.await.unwrap().unwrap();
    }
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(ran.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn two_workers_three_timed_tasks_all_accounted_for() {
    let pool = Arc::new(Pool::<u32>::new(2).unwrap());
    pool.run();

    let started = Arc::new(AtomicUsize::new(0));
    let mut handles = Vec::new();
    for i in 0..3u32 {
        let pool = Arc::clone(&pool);
        let started = Arc::clone(&started);
        handles.push(tokio::spawn(async move {
            pool.submit_timed(
                async move {
                    started.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(200)).await;
                    i
                },
                Duration::from_millis(50),
            )
            .await
        }));
        // First two grab the free workers; the third finds none and must
        // wait out its timeout.
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let mut completed = 0;
    let mut timed_out = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => completed += 1,
            Err(Error::JobTimedOut) => timed_out += 1,
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    assert_eq!(completed, 2);
    assert_eq!(timed_out, 1);
    assert_eq!(started.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn timed_submission_before_run_times_out() {
    let pool = Pool::<()>::new(2).unwrap();

    let ran = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&ran);
    let result = pool
        .submit_timed(
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            },
            Duration::from_millis(50),
        )
        .await;

    assert!(matches!(result, Err(Error::JobTimedOut)));
    assert_eq!(ran.load(Ordering::SeqCst), 0);
}

// ---------------------------------------------------------------------------
// Ordering
// ---------------------------------------------------------------------------

#[tokio::test]
async fn single_worker_completes_in_submission_order() {
    let pool = Arc::new(Pool::<()>::new(1).unwrap());
    pool.run();

    let order = Arc::new(std::sync::Mutex::new(Vec::new()));
    let mut handles = Vec::new();
    for i in 0..5 {
        let pool = Arc::clone(&pool);
        let order = Arc::clone(&order);
        handles.push(tokio::spawn(async move {
            pool.submit(async move {
                order.lock().unwrap().push(i);
                tokio::time::sleep(Duration::from_millis(20)).await;
            })
            .await
            .unwrap();
        }));
        // Fix the submission order before the next one goes in.
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    for handle in handles {
        handle.await.unwrap();
    }
    assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4]);
}

// ---------------------------------------------------------------------------
// Failure isolation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn panicking_task_does_not_poison_the_pool() {
    let pool = Pool::<u32>::new(1).unwrap();
    pool.run();

    let result = pool.submit(async { panic!("task exploded") }).await;
    assert!(matches!(result, Err(Error::TaskLost)));

    // Same single worker must still serve.
    let result = pool.submit(async { 7 }).await;
    assert_eq!(result.unwrap(), 7);
}

#[tokio::test]
async fn task_error_rides_inside_the_result() {
    let pool = Pool::<Result<u32, String>>::new(1).unwrap();
    pool.run();

    let result = pool
        .submit(async { Err::<u32, _>("scrape failed".to_string()) })
        .await
        .unwrap();

    assert_eq!(result, Err("scrape failed".to_string()));
}

// ---------------------------------------------------------------------------
// Shutdown
// ---------------------------------------------------------------------------

#[tokio::test]
async fn stop_waits_for_the_in_flight_task() {
    let pool = Arc::new(Pool::<()>::new(1).unwrap());
    pool.run();

    let finished = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&finished);
    let submitter = Arc::clone(&pool);
    let submission = tokio::spawn(async move {
        submitter
            .submit(async move {
                tokio::time::sleep(Duration::from_millis(200)).await;
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .await
    });

    // Let the task reach mid-execution before stopping.
    tokio::time::sleep(Duration::from_millis(50)).await;
    let stop_started = Instant::now();
    pool.stop().await;

    assert_eq!(
        finished.load(Ordering::SeqCst),
        1,
        "stop returned before the in-flight task finished"
    );
    assert!(stop_started.elapsed() >= Duration::from_millis(100));
    assert!(submission.await.unwrap().is_ok());
}

#[tokio::test]
async fn submission_after_stop_fails_fast() {
    let pool = Pool::<()>::new(2).unwrap();
    pool.run();
    pool.stop().await;

    assert!(matches!(
        pool.submit(async {}).await,
        Err(Error::PoolStopped)
    ));
    // Timed variant reports stopped, not timed out.
    assert!(matches!(
        pool.submit_timed(async {}, Duration::from_millis(50)).await,
        Err(Error::PoolStopped)
    ));
}

// ---------------------------------------------------------------------------
// Run idempotency
// ---------------------------------------------------------------------------

#[tokio::test]
async fn duplicate_run_does_not_widen_the_pool() {
    let pool = Arc::new(Pool::<()>::new(2).unwrap());
    pool.run();
    pool.run();

    let mut busy = Vec::new();
    for _ in 0..2 {
        let pool = Arc::clone(&pool);
        busy.push(tokio::spawn(async move {
            pool.submit(async {
                tokio::time::sleep(Duration::from_millis(300)).await;
            })
            .await
        }));
    }
    tokio::time::sleep(Duration::from_millis(50)).await;

    // A duplicated worker set would admit this third task.
    let result = pool
        .submit_timed(async {}, Duration::from_millis(50))
        .await;
    assert!(matches!(result, Err(Error::JobTimedOut)));

    for handle in busy {
        handle.await.unwrap().unwrap();
    }
}
