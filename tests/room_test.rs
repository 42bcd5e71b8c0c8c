use rusty_whisper::core::room::{Departure, RoomRegistry};
use rusty_whisper::error::RustyWhisperError;
use std::sync::{Arc, Barrier};
use std::thread;

#[test]
fn test_room_creation_on_first_join() {
    let registry = RoomRegistry::new();

    let participants = registry.join("lobby", "user1").unwrap();
    assert_eq!(participants, vec!["user1"]);
    assert!(registry.contains("lobby").unwrap());
    assert_eq!(registry.room_count().unwrap(), 1);

    let table = registry.lock().unwrap();
    let room = table.get("lobby").unwrap();
    assert_eq!(room.id, "lobby");
    assert_eq!(room.member_count(), 1);
    assert!(!room.is_counting_down());
}

#[test]
fn test_room_capacity_limit() {
    let registry = RoomRegistry::new();

    // Add members up to limit
    registry.join("small", "user1").unwrap();
    let participants = registry.join("small", "user2").unwrap();
    assert_eq!(participants, vec!["user1", "user2"]);

    // Try to exceed limit
    assert_eq!(
        registry.join("small", "user3"),
        Err(RustyWhisperError::RoomFull)
    );
    assert_eq!(registry.get_participants("small").unwrap().len(), 2);
    assert_eq!(registry.room_of("user3").unwrap(), None);
}

#[test]
fn test_join_same_room_twice_is_noop() {
    let registry = RoomRegistry::new();
    registry.join("r", "user1").unwrap();
    assert_eq!(registry.join("r", "user1").unwrap(), vec!["user1"]);
    assert_eq!(registry.get_participants("r").unwrap(), vec!["user1"]);
}

#[test]
fn test_join_other_room_requires_leaving_first() {
    let registry = RoomRegistry::new();
    registry.join("r1", "user1").unwrap();
    assert_eq!(
        registry.join("r2", "user1"),
        Err(RustyWhisperError::AlreadyInRoom)
    );

    registry.leave("user1").unwrap();
    assert!(registry.join("r2", "user1").is_ok());
}

#[test]
fn test_room_member_management() {
    let registry = RoomRegistry::new();
    registry.join("r", "user1").unwrap();
    registry.join("r", "user2").unwrap();

    // Remove member
    let departure = registry.leave("user1").unwrap();
    assert_eq!(
        departure,
        Some(Departure {
            room_id: "r".to_string(),
            remaining: vec!["user2".to_string()],
        })
    );
    assert!(registry.contains("r").unwrap());

    // Last member out deletes the room
    let departure = registry.leave("user2").unwrap().unwrap();
    assert!(departure.remaining.is_empty());
    assert!(!registry.contains("r").unwrap());

    // Leaving twice is harmless
    assert_eq!(registry.leave("user2").unwrap(), None);
}

#[test]
fn test_peer_lookup() {
    let registry = RoomRegistry::new();
    registry.join("r", "user1").unwrap();

    let table = registry.lock().unwrap();
    assert_eq!(table.get("r").unwrap().peer_of("user1"), None);
    drop(table);

    registry.join("r", "user2").unwrap();
    let table = registry.lock().unwrap();
    let room = table.get("r").unwrap();
    assert_eq!(room.peer_of("user1"), Some("user2"));
    assert_eq!(room.peer_of("user2"), Some("user1"));
    assert!(room.is_full());
}

#[test]
fn test_delete_room_is_idempotent() {
    let registry = RoomRegistry::new();
    registry.join("r", "user1").unwrap();
    registry.join("r", "user2").unwrap();

    assert!(registry.delete_room("r").unwrap());
    assert!(!registry.delete_room("r").unwrap());
    assert_eq!(registry.room_of("user1").unwrap(), None);
    assert!(registry.get_participants("r").unwrap().is_empty());

    // The same id can be reused afterwards
    assert_eq!(registry.join("r", "user3").unwrap(), vec!["user3"]);
}

#[test]
fn test_concurrent_joins_admit_two() {
    let registry = RoomRegistry::new();
    let contenders = 32;
    let barrier = Arc::new(Barrier::new(contenders));

    let handles: Vec<_> = (0..contenders)
        .map(|i| {
            let registry = registry.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                registry.join("contested", &format!("user{}", i)).is_ok()
            })
        })
        .collect();

    let admitted = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|ok| *ok)
        .count();

    assert_eq!(admitted, 2);
    assert_eq!(registry.get_participants("contested").unwrap().len(), 2);
}
