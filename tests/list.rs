use evio::list::{Direction, List};
use rand::Rng;

mod util;

use util::init;

#[test]
fn rotate() {
    init();

    // Rotating the empty and single-element lists changes nothing.
    let mut list: List<i32> = List::new();
    list.rotate();
    assert!(list.is_empty());

    list.push_back(7);
    list.rotate();
    assert_eq!(list.iter().copied().collect::<Vec<_>>(), [7]);

    // On longer lists the former tail moves to the head.
    let mut list = List::new();
    for i in 0..5 {
        list.push_back(i);
    }
    list.rotate();
    assert_eq!(list.iter().copied().collect::<Vec<_>>(), [4, 0, 1, 2, 3]);
    assert_eq!(list.len(), 5);
}

#[test]
fn cursor_drains_the_list() {
    init();

    let mut list = List::new();
    for i in 0..10 {
        list.push_back(i);
    }

    let mut steps = 0;
    let mut cursor = list.cursor(Direction::FromHead);
    while let Some(node) = cursor.next(&list) {
        list.remove(node);
        steps += 1;
    }
    assert_eq!(steps, 10);
    assert!(list.is_empty());
    assert_eq!(list.front(), None);
    assert_eq!(list.back(), None);
}

#[test]
fn negative_indices_agree_with_positive() {
    init();

    let mut list = List::new();
    for i in 0..7 {
        list.push_back(i * 10);
    }
    let len = list.len() as isize;
    for i in 0..len {
        assert_eq!(list.index(i), list.index(i - len), "index {}", i);
    }
    assert_eq!(list.index(len), None);
    assert_eq!(list.index(-len - 1), None);
    assert_eq!(list.index(-1), list.back());
}

#[test]
fn rotate_then_clone_is_independent() {
    init();

    let mut list = List::new();
    for i in 0..10 {
        list.push_back(i);
    }
    list.rotate();

    let mut copy = list.clone();
    assert_eq!(
        copy.iter().copied().collect::<Vec<_>>(),
        [9, 0, 1, 2, 3, 4, 5, 6, 7, 8]
    );
    assert_eq!(copy.len(), list.len());

    // Storage is independent: draining the copy leaves the original.
    let front = copy.front().unwrap();
    copy.remove(front);
    copy.push_back(99);
    assert_eq!(list.len(), 10);
    assert_eq!(
        list.iter().copied().collect::<Vec<_>>(),
        [9, 0, 1, 2, 3, 4, 5, 6, 7, 8]
    );
}

#[test]
fn search_and_find() {
    init();

    let mut list = List::new();
    for i in [3, 1, 4, 1, 5] {
        list.push_back(i);
    }

    let node = list.search(&4).unwrap();
    assert_eq!(list[node], 4);
    // First match wins.
    assert_eq!(list.search(&1), list.index(1));
    assert_eq!(list.search(&9), None);

    let node = list.find(|v| v % 2 == 0).unwrap();
    assert_eq!(list[node], 4);
}

#[test]
fn cursor_runs_both_ways() {
    init();

    let mut list = List::new();
    for i in 0..4 {
        list.push_back(i);
    }

    let mut cursor = list.cursor(Direction::FromTail);
    let mut seen = Vec::new();
    while let Some(node) = cursor.next(&list) {
        seen.push(list[node]);
    }
    assert_eq!(seen, [3, 2, 1, 0]);

    cursor.rewind(&list);
    assert_eq!(cursor.next(&list).map(|n| list[n]), Some(0));
    cursor.rewind_back(&list);
    assert_eq!(cursor.next(&list).map(|n| list[n]), Some(3));
}

#[test]
fn random_ops_match_a_vec_model() {
    init();

    let mut rng = rand::rng();
    let mut list = List::new();
    let mut model: Vec<u32> = Vec::new();

    for _ in 0..1000 {
        if model.is_empty() || rng.random_bool(0.6) {
            let value: u32 = rng.random();
            if rng.random_bool(0.5) {
                list.push_front(value);
                model.insert(0, value);
            } else {
                list.push_back(value);
                model.push(value);
            }
        } else {
            let at = rng.random_range(0..model.len());
            let node = list.index(at as isize).unwrap();
            assert_eq!(list.remove(node), model.remove(at));
        }
        assert_eq!(list.len(), model.len());
    }

    assert_eq!(list.iter().copied().collect::<Vec<_>>(), model);

    // The backwards chain agrees too.
    let mut reversed = Vec::new();
    let mut cursor = list.cursor(Direction::FromTail);
    while let Some(node) = cursor.next(&list) {
        reversed.push(list[node]);
    }
    model.reverse();
    assert_eq!(reversed, model);
}
