use boxsig::crypto::verify_signature;
use boxsig::{
    derive_signature_key, resolve_multisig_address, Address, BoxName, ClientConfig, Coordinator,
    Ed25519Signer, Error, GroupState, MemLedger, MultisigAccount, ProtocolContext,
    SignatureCollector, Signer,
};
use std::sync::Arc;

#[tokio::test]
async fn full_group_lifecycle() {
    boxsig::log::init_tracing_test();

    let signers = [
        Ed25519Signer::from_seed([1; 32]),
        Ed25519Signer::from_seed([2; 32]),
        Ed25519Signer::from_seed([3; 32]),
    ];
    let addresses: Vec<Address> = signers.iter().map(|s| s.address()).collect();
    let account = MultisigAccount::new(1, 2, addresses.clone()).unwrap();
    assert_eq!(
        account.address(),
        resolve_multisig_address(1, 2, &addresses).unwrap()
    );

    let ledger = Arc::new(MemLedger::default());
    let ctx = Arc::new(ProtocolContext::with_backend(
        addresses[0],
        ledger.clone(),
        ClientConfig::default(),
    ));
    let mut coordinator = Coordinator::new(ctx.clone());
    let mut collector = SignatureCollector::new(ctx);

    coordinator.setup(&account).await.unwrap();
    assert_eq!(ledger.multisig_setup().await.unwrap().signers, addresses);

    let group = coordinator.open_group().await.unwrap();
    let txn = b"multisig payment bytes".to_vec();
    coordinator.write_slot(group, 0, &txn).await.unwrap();

    // Two of three signers approve
    for signer in &signers[..2] {
        collector.sign_and_set(group, signer, &txn).await.unwrap();
    }
    let mut approvals = 0;
    for address in account.signers() {
        let name = BoxName::from(derive_signature_key(address, group));
        if let Some(sig) = ledger.box_value(&name).await {
            assert!(verify_signature(address, &txn, &sig).is_ok());
            approvals += 1;
        }
    }
    assert!(account.is_satisfied_by(approvals));

    // Tear down: signatures and slots must go before the group
    for address in &addresses[..2] {
        collector.clear_signature(group, address).await.unwrap();
    }
    assert!(matches!(
        coordinator.destroy_group(group).await,
        Err(Error::GroupNotEmpty { slots: 1, .. })
    ));
    coordinator.remove_slot(group, 0).await.unwrap();
    coordinator.destroy_group(group).await.unwrap();

    assert_eq!(coordinator.group_state(group), Some(GroupState::Destroyed));
    assert_eq!(ledger.box_count().await, 0);
    assert_eq!(ledger.locked_mbr().await, 0);
}

#[tokio::test]
async fn oracle_outage_is_retryable_and_writes_nothing() {
    boxsig::log::init_tracing_test();
    let ledger = Arc::new(MemLedger::default());
    let mut config = ClientConfig::default();
    config.retry.max_attempts = 2;
    config.retry.initial_backoff_ms = 1;
    config.retry.max_backoff_ms = 1;
    let ctx = Arc::new(ProtocolContext::with_backend(
        Address::from_public_key([9; 32]),
        ledger.clone(),
        config,
    ));
    let mut coordinator = Coordinator::new(ctx);
    let group = coordinator.open_group().await.unwrap();

    ledger.set_oracle_online(false).await;
    let err = coordinator.write_slot(group, 0, &[1; 64]).await.unwrap_err();
    assert!(matches!(err, Error::CostOracleUnavailable(_)));
    assert!(err.is_transient());
    assert_eq!(coordinator.slot_state(group, 0), None);

    ledger.set_params_online(false).await;
    ledger.set_oracle_online(true).await;
    let err = coordinator.write_slot(group, 0, &[1; 64]).await.unwrap_err();
    assert!(matches!(err, Error::CostOracleUnavailable(_)));

    ledger.set_params_online(true).await;
    coordinator.write_slot(group, 0, &[1; 64]).await.unwrap();
}
