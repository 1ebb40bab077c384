use witnet_explorer_storage::backends::in_memory::InMemoryStorage;
use witnet_explorer_storage::storage::{DeltaKind, ExplorerStorage, ReputationDelta, TrsRow};

#[test]
fn address_ids_are_sequential() {
    let mut storage = InMemoryStorage::new();

    storage
        .insert_addresses(&["wit1alice".to_string(), "wit1bob".to_string()])
        .unwrap();
    storage.insert_addresses(&["wit1carol".to_string()]).unwrap();

    let mut addresses = storage.addresses().unwrap();
    addresses.sort();
    assert_eq!(
        addresses,
        vec![
            ("wit1alice".to_string(), 1),
            ("wit1bob".to_string(), 2),
            ("wit1carol".to_string(), 3),
        ]
    );
}

#[test]
fn address_insert_is_upsert() {
    let mut storage = InMemoryStorage::new();

    storage.insert_addresses(&["wit1alice".to_string()]).unwrap();
    // Inserting the same address again must keep the assigned id
    storage
        .insert_addresses(&["wit1alice".to_string(), "wit1bob".to_string()])
        .unwrap();

    assert_eq!(storage.addresses["wit1alice"], 1);
    assert_eq!(storage.addresses["wit1bob"], 2);
    assert_eq!(storage.addresses.len(), 2);
}

#[test]
fn reputation_rows_preserve_batch_order() {
    let mut storage = InMemoryStorage::new();
    let batch = vec![
        ReputationDelta {
            address: "wit1bob".to_string(),
            epoch: 7,
            amount: 10,
            kind: DeltaKind::Gain,
        },
        ReputationDelta {
            address: "wit1alice".to_string(),
            epoch: 7,
            amount: -4,
            kind: DeltaKind::Lie,
        },
    ];

    storage.insert_reputation_deltas(&batch).unwrap();
    storage
        .insert_reputation_deltas(&[ReputationDelta {
            address: "wit1alice".to_string(),
            epoch: 8,
            amount: -6,
            kind: DeltaKind::Expire,
        }])
        .unwrap();

    assert_eq!(storage.reputation.len(), 3);
    assert_eq!(storage.reputation[0].address, "wit1bob");
    assert_eq!(storage.reputation[1].kind, DeltaKind::Lie);
    assert_eq!(storage.reputation[2].epoch, 8);
}

#[test]
fn trs_row_upsert_by_epoch() {
    let mut storage = InMemoryStorage::new();

    storage
        .insert_trs(TrsRow {
            epoch: 5,
            address_ids: vec![1],
            reputations: vec![100],
        })
        .unwrap();
    storage
        .insert_trs(TrsRow {
            epoch: 5,
            address_ids: vec![1, 2],
            reputations: vec![60, 40],
        })
        .unwrap();

    let row = storage.trs(5).unwrap().unwrap();
    assert_eq!(row.address_ids, vec![1, 2]);
    assert_eq!(row.reputations, vec![60, 40]);
    assert_eq!(storage.trs(4).unwrap(), None);
}

#[test]
fn delta_kind_renders_as_table_value() {
    assert_eq!(DeltaKind::Gain.to_string(), "gain");
    assert_eq!(DeltaKind::Lie.to_string(), "lie");
    assert_eq!(DeltaKind::Expire.to_string(), "expire");
}
