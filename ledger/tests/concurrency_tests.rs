//! Concurrent deposits and transfers against one store.

mod support;

use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use tally_common::ErrorKind;
use tally_ledger::AccountService;

use support::{balance_of, funded_account, memory_service, pausing_service};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_deposits_converge() {
    let (service, _) = memory_service();
    let account_id = service.create_account().await.unwrap().id;
    let deposits = 100;

    let handles: Vec<_> = (0..deposits)
        .map(|_| {
            let service = service.clone();
            tokio::spawn(async move { service.deposit(account_id, dec!(1.01)).await })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(
        balance_of(&*service, account_id).await,
        dec!(1.01) * Decimal::from(deposits)
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_jointly_overdrawing_transfers() {
    let (service, _) = memory_service();
    let source = funded_account(&*service, dec!(100)).await.id;
    let first = funded_account(&*service, Decimal::ZERO).await.id;
    let second = funded_account(&*service, Decimal::ZERO).await.id;

    let a = {
        let service = service.clone();
        tokio::spawn(async move { service.transfer(source, first, dec!(70)).await })
    };
    let b = {
        let service = service.clone();
        tokio::spawn(async move { service.transfer(source, second, dec!(70)).await })
    };
    let results = [a.await.unwrap(), b.await.unwrap()];

    let succeeded = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(succeeded, 1);
    let rejected = results.iter().find_map(|r| r.as_ref().err()).unwrap();
    assert_eq!(rejected.kind(), ErrorKind::Conflict);

    let source_after = balance_of(&*service, source).await;
    let first_after = balance_of(&*service, first).await;
    let second_after = balance_of(&*service, second).await;
    assert_eq!(source_after, dec!(30));
    assert_eq!(source_after + first_after + second_after, dec!(100));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_many_transfers_never_overdraw() {
    let (service, _) = memory_service();
    let source = funded_account(&*service, dec!(10)).await.id;
    let destination = funded_account(&*service, Decimal::ZERO).await.id;

    let handles: Vec<_> = (0..25)
        .map(|_| {
            let service = service.clone();
            tokio::spawn(async move {
                service.transfer(source, destination, dec!(1)).await
            })
        })
        .collect();

    let mut succeeded = 0;
    for handle in handles {
        if handle.await.unwrap().is_ok() {
            succeeded += 1;
        }
    }

    assert_eq!(succeeded, 10);
    assert_eq!(balance_of(&*service, source).await, Decimal::ZERO);
    assert_eq!(balance_of(&*service, destination).await, dec!(10));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_second_writer_waits_for_first() {
    let (service, source) = memory_service();
    let account_id = service.create_account().await.unwrap().id;
    let (paused, mut pause) = pausing_service(source, account_id);

    let first = {
        let paused = paused.clone();
        tokio::spawn(async move { paused.deposit(account_id, dec!(5)).await })
    };
    pause.reached().await;

    let second = {
        let service = service.clone();
        tokio::spawn(async move { service.deposit(account_id, dec!(7)).await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!second.is_finished());

    pause.release();
    first.await.unwrap().unwrap();
    second.await.unwrap().unwrap();

    assert_eq!(balance_of(&*service, account_id).await, dec!(12));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_self_transfers() {
    let (service, _) = memory_service();
    let account_id = funded_account(&*service, dec!(3.33)).await.id;
    let service: Arc<dyn AccountService> = service;

    let handles: Vec<_> = (0..10)
        .map(|_| {
            let service = service.clone();
            tokio::spawn(async move { service.transfer(account_id, account_id, dec!(3.33)).await })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(balance_of(&*service, account_id).await, dec!(3.33));
}
