mod common;

use std::sync::Arc;

use secrecy::SecretString;

use common::*;
use stellar_wallet_adapter::gateway::types::LedgerTransaction;
use stellar_wallet_adapter::{
    AdapterError, AdapterResult, EventType, FeeBumpRequest, Network, PaymentRequest,
    TransactionStatus,
};

#[tokio::test]
async fn send_payment_emits_lifecycle_in_order() -> AdapterResult<()> {
    let rpc = ScriptedRpc::new(Network::Testnet);
    let sink = RecordingSink::default();
    let orchestrator = orchestrator(&rpc, None, &sink);

    let wallet = orchestrator.create_wallet();
    rpc.fund(&wallet.address, 10);

    let record = orchestrator
        .send(PaymentRequest::native(&wallet.address, DESTINATION, "10"))
        .await?;

    assert_eq!(record.status, TransactionStatus::Success);
    assert_eq!(record.fee, "100");
    assert_eq!(record.to.as_deref(), Some(DESTINATION));
    assert_eq!(record.amount.as_deref(), Some("10.0000000"));
    assert_eq!(record.asset.as_deref(), Some("native"));
    assert_eq!(record.ledger, Some(1001));
    assert!(record.confirmed_at.is_some());

    assert_eq!(
        sink.types(),
        vec![
            EventType::WalletCreated,
            EventType::TransactionPending,
            EventType::TransactionSuccess
        ]
    );
    let events = sink.events();
    assert_eq!(events[1].transaction().map(|r| r.id.clone()), Some(record.id.clone()));
    assert_eq!(
        events[1].transaction().map(|r| r.status),
        Some(TransactionStatus::Pending)
    );

    assert_eq!(rpc.sequence(&wallet.address), Some(11));
    let submitted = rpc.submitted();
    assert_eq!(submitted.len(), 1);
    assert_eq!(submitted[0].sequence(), 11);
    assert_eq!(submitted[0].signatures().len(), 1);

    let fetched = orchestrator.get_transaction(&record.hash).await?;
    assert_eq!(fetched, record);
    Ok(())
}

#[tokio::test]
async fn send_uses_network_mode_fee() -> AdapterResult<()> {
    let rpc = ScriptedRpc::new(Network::Testnet);
    rpc.set_fee_mode(Some(250));
    let sink = RecordingSink::default();
    let orchestrator = orchestrator(&rpc, None, &sink);

    let wallet = orchestrator.import_wallet(&SecretString::from(SENDER_SECRET))?;
    rpc.fund(&wallet.address, 0);

    let record = orchestrator
        .send(
            PaymentRequest::native(SENDER, DESTINATION, "1.25")
                .with_memo("invoice 7", stellar_wallet_adapter::MemoType::Text),
        )
        .await?;
    assert_eq!(record.fee, "250");
    assert_eq!(rpc.submitted()[0].fee(), 250);
    Ok(())
}

#[tokio::test]
async fn rejected_submission_fails_and_retains_record() {
    let rpc = ScriptedRpc::new(Network::Testnet);
    let sink = RecordingSink::default();
    let orchestrator = orchestrator(&rpc, None, &sink);

    let wallet = orchestrator.create_wallet();
    rpc.fund(&wallet.address, 5);
    rpc.script([SubmitOutcome::rejected("tx_insufficient_balance")]);

    let err = orchestrator
        .send(PaymentRequest::native(&wallet.address, DESTINATION, "10"))
        .await
        .unwrap_err();

    match err.root_cause() {
        AdapterError::SubmissionRejected {
            status: Some(400),
            result_codes: Some(codes),
            ..
        } => assert_eq!(codes.transaction.as_deref(), Some("tx_insufficient_balance")),
        other => panic!("unexpected error {:?}", other),
    }
    assert_eq!(rpc.attempts(), 1);

    let record = err.record().cloned().unwrap();
    assert_eq!(record.status, TransactionStatus::Failed);
    assert_eq!(
        sink.types(),
        vec![
            EventType::WalletCreated,
            EventType::TransactionPending,
            EventType::TransactionFailed
        ]
    );

    let stored = orchestrator.get_transaction(&record.hash).await.unwrap();
    assert_eq!(stored.id, record.id);
    assert_eq!(stored.status, TransactionStatus::Failed);
}

#[tokio::test]
async fn failed_in_ledger_is_reported_with_ledger() {
    let rpc = ScriptedRpc::new(Network::Testnet);
    let sink = RecordingSink::default();
    let orchestrator = orchestrator(&rpc, None, &sink);

    let wallet = orchestrator.create_wallet();
    rpc.fund(&wallet.address, 1);
    rpc.script([SubmitOutcome::FailInLedger]);

    let err = orchestrator
        .send(PaymentRequest::native(&wallet.address, DESTINATION, "3"))
        .await
        .unwrap_err();
    assert!(matches!(
        err.root_cause(),
        AdapterError::SubmissionRejected { .. }
    ));
    let record = err.record().unwrap();
    assert_eq!(record.status, TransactionStatus::Failed);
    assert_eq!(record.ledger, Some(1001));
    assert_eq!(sink.types().last(), Some(&EventType::TransactionFailed));
}

#[tokio::test]
async fn transient_failures_are_retried() -> AdapterResult<()> {
    let rpc = ScriptedRpc::new(Network::Testnet);
    let sink = RecordingSink::default();
    let orchestrator = orchestrator(&rpc, None, &sink);

    let wallet = orchestrator.create_wallet();
    rpc.fund(&wallet.address, 1);
    rpc.script([SubmitOutcome::status(503), SubmitOutcome::status(504)]);

    let record = orchestrator
        .send(PaymentRequest::native(&wallet.address, DESTINATION, "1"))
        .await?;
    assert_eq!(record.status, TransactionStatus::Success);
    assert_eq!(rpc.attempts(), 3);
    assert_same_envelope_resent(&rpc, &record.hash);
    // one pending and one terminal event regardless of attempts
    assert_eq!(sink.types().len(), 3);
    Ok(())
}

#[tokio::test]
async fn exhausted_retries_surface_transient_error() {
    let rpc = ScriptedRpc::new(Network::Testnet);
    let sink = RecordingSink::default();
    let orchestrator = orchestrator(&rpc, None, &sink);

    let wallet = orchestrator.create_wallet();
    rpc.fund(&wallet.address, 1);
    rpc.script([
        SubmitOutcome::status(503),
        SubmitOutcome::status(503),
        SubmitOutcome::status(503),
        SubmitOutcome::Accept,
    ]);

    let err = orchestrator
        .send(PaymentRequest::native(&wallet.address, DESTINATION, "1"))
        .await
        .unwrap_err();
    assert!(matches!(
        err.root_cause(),
        AdapterError::NetworkTransient {
            status: Some(503),
            ..
        }
    ));
    assert_eq!(rpc.attempts(), 3);
    assert_eq!(
        err.record().map(|r| r.status),
        Some(TransactionStatus::Failed)
    );
    if let Some(record) = err.record() {
        assert_same_envelope_resent(&rpc, &record.hash);
    }
}

#[tokio::test]
async fn concurrent_sends_from_one_address_use_consecutive_sequences() {
    let rpc = ScriptedRpc::new(Network::Testnet);
    let sink = RecordingSink::default();
    let orchestrator = Arc::new(orchestrator(&rpc, None, &sink));

    let wallet = orchestrator.create_wallet();
    rpc.fund(&wallet.address, 10);

    let first = {
        let orchestrator = orchestrator.clone();
        let from = wallet.address.clone();
        tokio::spawn(async move {
            orchestrator
                .send(PaymentRequest::native(from, DESTINATION, "1"))
                .await
        })
    };
    let second = {
        let orchestrator = orchestrator.clone();
        let from = wallet.address.clone();
        tokio::spawn(async move {
            orchestrator
                .send(PaymentRequest::native(from, DESTINATION, "2"))
                .await
        })
    };

    let first = first.await.unwrap().unwrap();
    let second = second.await.unwrap().unwrap();
    assert_ne!(first.id, second.id);

    let mut sequences: Vec<i64> = rpc.submitted().iter().map(|e| e.sequence()).collect();
    sequences.sort_unstable();
    assert_eq!(sequences, vec![11, 12]);
    assert_eq!(rpc.sequence(&wallet.address), Some(12));

    // pending strictly precedes the terminal event for each record
    let events = sink.events();
    for record in [&first, &second] {
        let positions: Vec<EventType> = events
            .iter()
            .filter(|e| e.transaction().map(|r| r.id.as_str()) == Some(record.id.as_str()))
            .map(|e| e.event_type)
            .collect();
        assert_eq!(
            positions,
            vec![EventType::TransactionPending, EventType::TransactionSuccess]
        );
    }
}

#[tokio::test]
async fn send_rejects_unknown_wallet_and_bad_requests() {
    let rpc = ScriptedRpc::new(Network::Testnet);
    let sink = RecordingSink::default();
    let orchestrator = orchestrator(&rpc, None, &sink);

    let err = orchestrator
        .send(PaymentRequest::native(SENDER, DESTINATION, "1"))
        .await
        .unwrap_err();
    assert!(matches!(err, AdapterError::WalletNotFound(_)));

    let wallet = orchestrator.create_wallet();
    let err = orchestrator
        .send(PaymentRequest::native(&wallet.address, "not-an-address", "1"))
        .await
        .unwrap_err();
    assert!(matches!(err, AdapterError::InvalidRequest(_)));

    let err = orchestrator
        .send(
            PaymentRequest::native(&wallet.address, DESTINATION, "1").with_asset("USDC:nowhere"),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AdapterError::AccountNotFound(_)));

    rpc.fund(&wallet.address, 1);
    let err = orchestrator
        .send(
            PaymentRequest::native(&wallet.address, DESTINATION, "1").with_asset("USDC:nowhere"),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AdapterError::InvalidAsset(_)));

    assert_eq!(rpc.attempts(), 0);
    assert_eq!(sink.types(), vec![EventType::WalletCreated]);
}

#[tokio::test]
async fn fee_bump_below_inner_fee_fails_without_events() {
    let rpc = ScriptedRpc::new(Network::Testnet);
    let sink = RecordingSink::default();
    let orchestrator = orchestrator(&rpc, Some(SPONSOR_SECRET), &sink);

    rpc.fund(SENDER, 10);
    let original = stuck_payment(&rpc, 10, 100);

    let err = orchestrator
        .fee_bump(FeeBumpRequest::new(original.hash_hex().unwrap(), "50"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AdapterError::FeeTooLow {
            max_fee: 50,
            inner_fee: 100
        }
    ));
    assert!(sink.events().is_empty());
    assert_eq!(rpc.attempts(), 0);
}

#[tokio::test]
async fn fee_bump_rate_pays_for_bump_operation() -> AdapterResult<()> {
    let rpc = ScriptedRpc::new(Network::Testnet);
    let sink = RecordingSink::default();
    let orchestrator = orchestrator(&rpc, Some(SPONSOR_SECRET), &sink);

    rpc.fund(SENDER, 10);
    let original = stuck_payment(&rpc, 10, 100);

    let record = orchestrator
        .fee_bump(FeeBumpRequest::new(original.hash_hex()?, "150"))
        .await?;

    let submitted = rpc.submitted();
    assert_eq!(submitted.len(), 1);
    assert_eq!(submitted[0].fee(), 300);
    assert!(submitted[0].fee() >= 2 * original.fee());
    assert_eq!(record.fee, "300");
    Ok(())
}

#[tokio::test]
async fn fee_bump_produces_new_record() -> AdapterResult<()> {
    let rpc = ScriptedRpc::new(Network::Testnet);
    let sink = RecordingSink::default();
    let orchestrator = orchestrator(&rpc, Some(SPONSOR_SECRET), &sink);

    rpc.fund(SENDER, 10);
    let original = stuck_payment(&rpc, 10, 100);
    let original_hash = original.hash_hex()?;
    assert_eq!(orchestrator.sponsor_address()?.as_deref(), Some(SPONSOR));

    let record = orchestrator
        .fee_bump(FeeBumpRequest::new(&original_hash, "400"))
        .await?;

    assert_eq!(record.status, TransactionStatus::Success);
    assert_ne!(record.hash, original_hash);
    // 400 per operation for the payment and the bump
    assert_eq!(record.fee, "800");
    assert_eq!(record.from, SENDER);
    assert_eq!(record.to.as_deref(), Some(DESTINATION));
    assert_eq!(record.amount.as_deref(), Some("10.0000000"));
    assert_eq!(record.asset.as_deref(), Some("native"));
    assert_eq!(
        sink.types(),
        vec![EventType::TransactionPending, EventType::TransactionSuccess]
    );

    let submitted = rpc.submitted();
    assert_eq!(submitted.len(), 1);
    assert!(submitted[0].is_fee_bump());
    assert_eq!(submitted[0].fee_source().as_deref(), Some(SPONSOR));
    assert_eq!(submitted[0].signatures().len(), 1);
    assert_eq!(rpc.sequence(SENDER), Some(11));

    // the original stays as the ledger reported it
    let untouched = orchestrator.get_transaction(&original_hash).await?;
    assert_ne!(untouched.id, record.id);
    assert_eq!(untouched.status, TransactionStatus::Pending);
    assert_eq!(untouched.fee, "100");
    Ok(())
}

#[tokio::test]
async fn fee_bump_requires_a_sponsor() -> AdapterResult<()> {
    let rpc = ScriptedRpc::new(Network::Testnet);
    let sink = RecordingSink::default();
    let orchestrator = orchestrator(&rpc, None, &sink);

    rpc.fund(SENDER, 3);
    let original = stuck_payment(&rpc, 3, 100);
    let hash = original.hash_hex()?;
    assert_eq!(orchestrator.sponsor_address()?, None);

    let err = orchestrator
        .fee_bump(FeeBumpRequest::new(&hash, "300"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AdapterError::SponsorNotConfigured(Network::Testnet)
    ));

    // an explicit secret takes priority over the (missing) default
    let record = orchestrator
        .fee_bump(
            FeeBumpRequest::new(&hash, "300")
                .with_sponsor_secret(SecretString::from(SPONSOR_SECRET)),
        )
        .await?;
    assert_eq!(record.status, TransactionStatus::Success);
    assert_eq!(
        rpc.submitted()[0].fee_source().as_deref(),
        Some(SPONSOR)
    );
    Ok(())
}

#[tokio::test]
async fn fee_bump_rejects_confirmed_and_malformed_requests() {
    let rpc = ScriptedRpc::new(Network::Testnet);
    let sink = RecordingSink::default();
    let orchestrator = orchestrator(&rpc, Some(SPONSOR_SECRET), &sink);

    rpc.fund(SENDER, 1);
    let original = stuck_payment(&rpc, 1, 100);
    let hash = original.hash_hex().unwrap();
    rpc.put_transaction(LedgerTransaction {
        hash: hash.clone(),
        ledger: Some(900),
        successful: Some(true),
        source_account: Some(SENDER.to_string()),
        envelope_xdr: original.to_base64().unwrap(),
        ..LedgerTransaction::default()
    });

    let err = orchestrator
        .fee_bump(FeeBumpRequest::new(&hash, "500"))
        .await
        .unwrap_err();
    assert!(matches!(err, AdapterError::AlreadyConfirmed(_)));

    let err = orchestrator
        .fee_bump(FeeBumpRequest::new(&hash, "-1"))
        .await
        .unwrap_err();
    assert!(matches!(err, AdapterError::InvalidArgument(_)));

    let err = orchestrator
        .fee_bump(FeeBumpRequest::new("abc", "500"))
        .await
        .unwrap_err();
    assert!(matches!(err, AdapterError::InvalidArgument(_)));

    let err = orchestrator
        .fee_bump(FeeBumpRequest::new("ff".repeat(32), "500"))
        .await
        .unwrap_err();
    assert!(matches!(err, AdapterError::NetworkQueryFailed(_)));

    assert!(sink.events().is_empty());
}
