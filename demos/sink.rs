use std::cell::RefCell;
use std::rc::Rc;

use tandem::{Pull, Push};

const WIDTH: usize = 16;

fn main() {
    let lines = Rc::new(RefCell::new(Vec::new()));
    let out = lines.clone();

    // Lays words out into lines of at most WIDTH characters. The body only
    // ever sees one word at a time and keeps its own position.
    let mut sink = Push::new(move |source: &mut Pull<&'static str>| {
        let mut line = String::new();
        for word in source.iter() {
            if !line.is_empty() && line.len() + 1 + word.len() > WIDTH {
                out.borrow_mut().push(std::mem::take(&mut line));
            }
            if !line.is_empty() {
                line.push(' ');
            }
            line.push_str(word);

            // Flush on an empty word.
            if word.is_empty() {
                out.borrow_mut().push(std::mem::take(&mut line).trim_end().to_string());
            }
        }
    });

    let text = "the quick brown fox jumps over the lazy dog";
    sink.extend(text.split(' '));
    sink.send("");
    drop(sink);

    for line in lines.borrow().iter() {
        println!("|{:<width$}|", line, width = WIDTH);
    }
    assert_eq!(
        *lines.borrow(),
        ["the quick brown", "fox jumps over", "the lazy dog"]
    );
}

#[test]
fn sink() {
    main()
}
