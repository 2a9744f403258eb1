#![no_main]

use kemono_core::backing::{BackingChange, BackingList};
use kemono_core::pager::{PageCursor, RevealWindow};
use libfuzzer_sys::fuzz_target;

fn check(window: &RevealWindow, cursor: &PageCursor, len: usize, page_size: usize) {
    assert!(window.visible_count() <= len);
    assert!(window.visible_count() >= page_size.min(len));
    let last = len.div_ceil(page_size).saturating_sub(1);
    assert!(cursor.current_page() <= last);
    let range = cursor.range();
    assert!(range.start <= range.end && range.end <= len);
}

fuzz_target!(|data: &[u8]| {
    let Some((&first, ops)) = data.split_first() else {
        return;
    };
    let page_size = usize::from(first % 32) + 1;

    let mut list = BackingList::from_items(Vec::<u8>::new());
    let mut seen = list.snapshot();
    let mut window = RevealWindow::new(page_size, 0);
    let mut cursor = PageCursor::new(page_size, 0);
    let mut ticket = None;

    for pair in ops.chunks(2) {
        let op = pair[0];
        let arg = pair.get(1).copied().unwrap_or(0);

        match op % 8 {
            0 => {
                if ticket.is_none() {
                    ticket = window.begin_reveal();
                } else {
                    assert!(window.begin_reveal().is_none());
                }
            }
            1 => {
                if let Some(t) = ticket.take() {
                    let before = window.visible_count();
                    assert!(window.complete_reveal(t));
                    assert!(window.visible_count() >= before);
                }
            }
            2 => list.extend(std::iter::repeat_n(arg, usize::from(arg % 16))),
            3 => list.replace(vec![arg; usize::from(arg)]),
            4 => {
                let _ = cursor.next_page();
            }
            5 => {
                let _ = cursor.prev_page();
            }
            6 => {
                let _ = cursor.go_to(usize::from(arg));
            }
            _ => {
                let next = list.snapshot();
                match BackingChange::classify(seen.generation(), seen.len(), next.generation(), next.len()) {
                    BackingChange::Unchanged => {}
                    BackingChange::Grew => {
                        window.grow(next.len());
                        cursor.grow(next.len());
                    }
                    BackingChange::Replaced => {
                        ticket = None;
                        window.reset(next.len());
                        cursor.reset(next.len());
                    }
                }
                seen = next;
            }
        }

        assert_eq!(window.is_expanding(), ticket.is_some());
        check(&window, &cursor, seen.len(), page_size);
    }
});
