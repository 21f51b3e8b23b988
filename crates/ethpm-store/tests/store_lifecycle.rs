use ethpm_common::{ContentAddress, RegistryId, RegistryUri};
use ethpm_store::{
    ChainDataStore, ContentStore, FileContentStore, RegistryRef, RegistryStore, StoreErrorKind,
};

#[tokio::test]
async fn add_then_activate_by_alias() {
    let root = tempfile::tempdir().unwrap();
    let store = RegistryStore::open(root.path().join("registry-store"));

    let first = RegistryUri::parse("erc1319://0xA635F17288187daE5b424D343E21FF44a79ce922:1").unwrap();
    let foo = RegistryUri::parse("erc1319://0x6b5DA3cA4286Baa7fBaf64EEEE1834C7d430B729:1").unwrap();
    store.add(&first, None).await.unwrap();
    store.add(&foo, Some("foo")).await.unwrap();

    store
        .activate(&RegistryRef::Alias("foo".into()))
        .await
        .unwrap();

    let active: Vec<_> = store
        .list()
        .await
        .unwrap()
        .into_iter()
        .filter(|e| e.active)
        .collect();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id(), foo.registry);
    assert_eq!(active[0].id().chain_id, 1);

    // a fresh handle over the same file sees the same state
    let reopened = RegistryStore::open(root.path().join("registry-store"));
    assert_eq!(reopened.active().await.unwrap().unwrap().id(), foo.registry);

    // and activation by identity flips it back
    store
        .activate(&RegistryRef::Id(RegistryId::new(first.registry.address, 1)))
        .await
        .unwrap();
    assert_eq!(reopened.active().await.unwrap().unwrap().id(), first.registry);
}

#[tokio::test]
async fn mirrored_bytes_survive_reopen() {
    let root = tempfile::tempdir().unwrap();
    let payloads: Vec<Vec<u8>> = vec![
        Vec::new(),
        b"pragma solidity ^0.4.24;".to_vec(),
        vec![0u8; 4096],
    ];

    let store = FileContentStore::new(root.path().join("content"));
    let mut addresses = Vec::new();
    for p in &payloads {
        addresses.push(store.put(p).await.unwrap());
        store.put(p).await.unwrap();
    }
    assert_eq!(store.list().await.unwrap().len(), payloads.len());

    let reopened = FileContentStore::new(root.path().join("content"));
    for (address, payload) in addresses.iter().zip(&payloads) {
        assert_eq!(&reopened.get(address).await.unwrap().unwrap()[..], &payload[..]);
        assert_eq!(*address, ContentAddress::compute(payload).unwrap());
    }
}

#[tokio::test]
async fn scrape_lock_is_exclusive_per_chain() {
    let root = tempfile::tempdir().unwrap();
    let chain_data = ChainDataStore::open(root.path().join("chain-data"));
    let held = chain_data.lock(1).unwrap();
    assert_eq!(chain_data.lock(1).unwrap_err().kind(), StoreErrorKind::Locked);
    let other = chain_data.lock(3).unwrap();
    drop(held);
    drop(other);
    chain_data.lock(1).unwrap();
}
