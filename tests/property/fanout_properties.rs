//! Property-based tests for fan-out ordering and failure isolation

use proptest::prelude::*;
use std::time::Duration;
use temper::error::OrchestrationError;
use temper::fanout::{FanOutConfig, FanOutExecutor};

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .start_paused(true)
        .build()
        .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Outputs line up with inputs whatever the completion order and bound.
    #[test]
    fn test_batch_preserves_input_order(
        delays in proptest::collection::vec(0u64..50, 1..20),
        bound in 1usize..6,
    ) {
        let items = runtime().block_on(async {
            FanOutExecutor::new(FanOutConfig::bounded(bound))
                .unwrap()
                .run(delays.clone(), |delay| async move {
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                    Ok(delay + 1)
                })
                .await
                .unwrap()
        });

        prop_assert_eq!(items.len(), delays.len());
        for (index, item) in items.iter().enumerate() {
            prop_assert_eq!(item.index, index);
            prop_assert_eq!(item.output().copied(), Some(delays[index] + 1));
        }
    }

    /// Exactly the failing inputs are marked failed.
    #[test]
    fn test_failures_stay_with_their_inputs(
        inputs in proptest::collection::vec(any::<bool>(), 1..20),
    ) {
        let items = runtime().block_on(async {
            FanOutExecutor::unbounded()
                .run(inputs.clone(), |fails| async move {
                    if fails {
                        Err(OrchestrationError::Input("rejected".to_string()))
                    } else {
                        Ok(())
                    }
                })
                .await
                .unwrap()
        });

        for (item, fails) in items.iter().zip(&inputs) {
            prop_assert_eq!(item.is_failed(), *fails);
        }
    }
}
