use std::rc::Rc;

use tandem::{Pull, Push};

enum Tree {
    Leaf(char),
    Node(Rc<Tree>, Rc<Tree>),
}

fn leaf(value: char) -> Rc<Tree> {
    Rc::new(Tree::Leaf(value))
}

fn node(left: Rc<Tree>, right: Rc<Tree>) -> Rc<Tree> {
    Rc::new(Tree::Node(left, right))
}

// Plain recursion: the traversal suspends from arbitrarily deep in its own
// call stack.
fn traverse(tree: &Tree, sink: &mut Push<char>) {
    match tree {
        Tree::Leaf(value) => {
            sink.send(*value);
        }
        Tree::Node(left, right) => {
            traverse(left, sink);
            traverse(right, sink);
        }
    }
}

fn fringe(tree: Rc<Tree>) -> Pull<char> {
    Pull::new(move |sink| traverse(&tree, sink))
}

fn same_fringe(a: Rc<Tree>, b: Rc<Tree>) -> bool {
    let mut a = fringe(a);
    let mut b = fringe(b);
    a.iter().eq(b.iter())
}

fn main() {
    // ((a b) c) and (a (b c)) have the same fringe, (a (b d)) does not.
    let left = node(node(leaf('a'), leaf('b')), leaf('c'));
    let right = node(leaf('a'), node(leaf('b'), leaf('c')));
    let other = node(leaf('a'), node(leaf('b'), leaf('d')));

    let fringe_left: String = fringe(left.clone()).iter().collect();
    println!("fringe: {}", fringe_left);

    let same = same_fringe(left.clone(), right);
    println!("((a b) c) vs (a (b c)): {}", same);
    assert!(same);

    let same = same_fringe(left, other);
    println!("((a b) c) vs (a (b d)): {}", same);
    assert!(!same);
}

#[test]
fn same_fringe_demo() {
    main()
}
