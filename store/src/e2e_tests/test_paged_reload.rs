//! Test that page offsets derived from page numbers survive a reload.

use crate::e2e_tests::helpers::{TestStore, payload};
use crate::storage::paged::{NO_PAGE, PageLayout, PagedBTree, PagedTreeFile};

fn assert_offsets_derivable(layout: &PageLayout, tree: &PagedBTree) {
    let count = i32::try_from(tree.len()).expect("small");
    for page in tree.pages() {
        let n = page.num_page;
        assert_eq!(page.parent_page, layout.parent_offset(n), "parent of page {n}");
        assert_eq!(
            page.pointers[0],
            layout.child_offset(PageLayout::left_child(n), count),
            "left child of page {n}"
        );
        assert_eq!(
            page.pointers[1],
            layout.child_offset(PageLayout::right_child(n), count),
            "right child of page {n}"
        );
        assert!(page.pointers[2..].iter().all(|p| *p == NO_PAGE));
    }
}

#[test]
fn test_reload_reproduces_offsets() {
    for degree in [2, 3, 4, 32] {
        for count in [0, 1, 7, 100] {
            let mut test = TestStore::new();
            for n in 1..=count {
                test.insert(&payload(n));
            }

            let built = test.store.rebuild_paged_tree(degree).expect("rebuild");
            let layout = *built.layout();
            assert_offsets_derivable(&layout, &built);

            let mut file = PagedTreeFile::open(&test.store.tree_path()).expect("open");
            assert_eq!(file.header().degree, degree);
            assert_eq!(file.header().last_key, count);
            assert_eq!(
                file.len(),
                12 + u64::try_from(built.len()).expect("fits") * layout.page_size()
            );

            let order: Vec<i32> = file
                .read_preorder()
                .expect("preorder")
                .into_iter()
                .map(|(offset, page)| {
                    assert_eq!(offset, layout.page_offset(page.num_page));
                    page.num_page
                })
                .collect();
            assert_eq!(order, built.preorder(), "degree {degree}, {count} entries");

            let loaded = test.store.load_paged_tree().expect("load");
            assert_offsets_derivable(&layout, &loaded);
            assert_eq!(loaded, built, "degree {degree}, {count} entries");
        }
    }
}

#[test]
fn test_rebuild_after_reopen_is_byte_identical() {
    let mut test = TestStore::new();
    for n in 1..=64 {
        test.insert(&payload(n));
    }
    test.store.rebuild_paged_tree(6).expect("rebuild");
    let first = std::fs::read(test.store.tree_path()).expect("read tree file");

    test.reopen();
    test.store.rebuild_paged_tree(6).expect("rebuild");
    let second = std::fs::read(test.store.tree_path()).expect("read tree file");
    assert_eq!(first, second);
}

#[test]
fn test_degree_32_pages_are_676_bytes() {
    let mut test = TestStore::new();
    for n in 1..=40 {
        test.insert(&payload(n));
    }
    let tree = test.store.rebuild_paged_tree(32).expect("rebuild");
    assert_eq!(tree.len(), 2);

    let bytes = std::fs::read(test.path().join("records.tree")).expect("read");
    assert_eq!(bytes.len(), 12 + 2 * 676);
    // Header: degree, next page, last key.
    assert_eq!(&bytes[0..4], &32i32.to_be_bytes());
    assert_eq!(&bytes[4..8], &2i32.to_be_bytes());
    assert_eq!(&bytes[8..12], &40i32.to_be_bytes());
    // Page 0 points at page 1 and has no right child.
    assert_eq!(&bytes[12..16], &0i32.to_be_bytes());
    assert_eq!(&bytes[16..20], &31i32.to_be_bytes());
    assert_eq!(bytes[20], 0);
    assert_eq!(&bytes[21..29], &(-1i64).to_be_bytes());
    assert_eq!(&bytes[29..37], &688i64.to_be_bytes());
}
