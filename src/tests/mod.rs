use std::cell::Cell;
use std::rc::Rc;

mod pull;

/// Sets a flag when dropped, to observe which frames were unwound.
struct SetOnDrop(Rc<Cell<bool>>);

impl Drop for SetOnDrop {
    fn drop(&mut self) {
        self.0.set(true);
    }
}

fn flag() -> (Rc<Cell<bool>>, SetOnDrop) {
    let flag = Rc::new(Cell::new(false));
    (flag.clone(), SetOnDrop(flag))
}
