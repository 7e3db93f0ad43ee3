//! Helpers to make writing XML less unpleasant.
//!
//! Documents are built with the `xml!` macro, which reads roughly like the
//! XML it writes:
//!
//! * `<tag` opens a tag and `>`/`/>` end it; `</tag>` closes an inline tag
//!   and `/tag>` closes one that started on an earlier line
//! * `;` starts a new, indented line
//! * `attr=[...]` writes an attribute
//! * `(expr)` writes anything `Display`, `ESC(expr)` writes escaped user
//!   text, and `MATRIX(&m)` writes a matrix in row-major order
//! * `for pat in (iter) { ... }` and `if (cond) { ... } else { ... }` work
//!   as you would expect

use cgmath::Matrix4;
use std::fmt::{self, Display, Write};

pub struct Xml {
    s: String,
    cur_indent: u32,
}

const INDENT: &str = "  ";

impl Xml {
    pub fn with_capacity(capacity: usize) -> Xml {
        Xml {
            s: String::with_capacity(capacity),
            cur_indent: 0,
        }
    }

    /// A buffer for a fragment that will be spliced into a document at
    /// nesting depth `indent`.
    pub fn with_indent(indent: u32) -> Xml {
        Xml {
            s: String::new(),
            cur_indent: indent,
        }
    }

    pub fn string(self) -> String {
        self.s
    }

    pub fn as_str(&self) -> &str {
        &self.s
    }

    pub fn start_open_tag(&mut self) {
        self.s.push_str("<");
        self.cur_indent += 1;
    }

    pub fn start_close_tag(&mut self) {
        self.s.push_str("</");
        self.cur_indent -= 1;
    }

    pub fn deindent_and_start_close_tag(&mut self) {
        let len = self.s.len().saturating_sub(INDENT.len());
        self.s.truncate(len);
        self.s.push_str("</");
        self.cur_indent -= 1;
    }

    pub fn nl(&mut self) {
        self.s.push('\n');
        for _ in 0..self.cur_indent {
            self.s.push_str(INDENT);
        }
    }

    pub fn end_tag(&mut self) {
        self.s.push_str(">");
    }

    pub fn end_empty_tag(&mut self) {
        self.s.push_str("/>");
        self.cur_indent -= 1;
    }

    pub fn push_str(&mut self, s: &str) {
        self.s.push_str(s);
    }

    /// Appends a fragment built with `with_indent` at the current depth.
    pub fn push_fragment(&mut self, frag: &Xml) {
        self.s.push_str(&frag.s);
    }

    pub fn push_text<T: Display>(&mut self, x: &T) {
        // Writing to a String can't fail
        let _ = write!(&mut self.s, "{}", x);
    }

    pub fn push_escaped(&mut self, text: &str) {
        self.push_text(&Esc(text));
    }

    /// Writes the 16 entries of `m` row by row, which is the order COLLADA
    /// wants.
    pub fn matrix(&mut self, m: &Matrix4<f64>) {
        let cols: &[[f64; 4]; 4] = m.as_ref();
        let mut sep = "";
        for row in 0..4 {
            for col in cols.iter() {
                let _ = write!(&mut self.s, "{}{}", sep, col[row]);
                sep = " ";
            }
        }
    }
}

/// Escapes user text (object, material, bone names...) for use in
/// attributes and character data.
struct Esc<'a>(&'a str);

impl<'a> Display for Esc<'a> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for c in self.0.chars() {
            match c {
                '&' => f.write_str("&amp;")?,
                '<' => f.write_str("&lt;")?,
                '>' => f.write_str("&gt;")?,
                '"' => f.write_str("&quot;")?,
                '\'' => f.write_str("&apos;")?,
                _ => f.write_char(c)?,
            }
        }
        Ok(())
    }
}

macro_rules! xml_attr {
    ($x:ident; ESC($e:expr) $($rest:tt)*) => {
        $x.push_escaped($e);
        xml_attr!($x; $($rest)*);
    };
    ($x:ident; ($e:expr) $($rest:tt)*) => {
        $x.push_text(&$e);
        xml_attr!($x; $($rest)*);
    };
    ($x:ident; $strlit:tt $($rest:tt)*) => {
        $x.push_str($strlit);
        xml_attr!($x; $($rest)*);
    };
    ($x:ident;) => {};
}

macro_rules! xml {
    ($x:ident; </ $($rest:tt)*) => {
        $x.start_close_tag();
        xml!($x; $($rest)*)
    };
    ($x:ident; < $($rest:tt)*) => {
        $x.start_open_tag();
        xml!($x; $($rest)*)
    };
    ($x:ident; /> $($rest:tt)*) => {
        $x.end_empty_tag();
        xml!($x; $($rest)*)
    };
    ($x:ident; > $($rest:tt)*) => {
        $x.end_tag();
        xml!($x; $($rest)*)
    };
    ($x:ident; ; $($rest:tt)*) => {
        $x.nl();
        xml!($x; $($rest)*)
    };
    ($x:ident; / $($rest:tt)*) => {
        $x.deindent_and_start_close_tag();
        xml!($x; $($rest)*)
    };
    ($x:ident; $attr:ident = [ $($val:tt)* ] $($rest:tt)*) => {
        $x.push_str(" ");
        $x.push_str(stringify!($attr));
        $x.push_str("=\"");
        xml_attr!($x; $($val)*);
        $x.push_str("\"");
        xml!($x; $($rest)*)
    };
    ($x:ident; if ($cond:expr) { $($then:tt)* } else { $($els:tt)* } $($rest:tt)*) => {
        if $cond {
            xml!($x; $($then)*);
        } else {
            xml!($x; $($els)*);
        }
        xml!($x; $($rest)*);
    };
    ($x:ident; if ($cond:expr) { $($then:tt)* } $($rest:tt)*) => {
        if $cond {
            xml!($x; $($then)*);
        }
        xml!($x; $($rest)*);
    };
    ($x:ident; for $p:pat in ($it:expr) { $($body:tt)* } $($rest:tt)*) => {
        for $p in $it {
            xml!($x; $($body)*);
        }
        xml!($x; $($rest)*);
    };
    ($x:ident; MATRIX($e:expr) $($rest:tt)*) => {
        $x.matrix($e);
        xml!($x; $($rest)*);
    };
    ($x:ident; ESC($e:expr) $($rest:tt)*) => {
        $x.push_escaped($e);
        xml!($x; $($rest)*);
    };
    ($x:ident; $word:ident $($rest:tt)*) => {
        $x.push_str(stringify!($word));
        xml!($x; $($rest)*)
    };
    ($x:ident; ($e:expr) $($rest:tt)*) => {
        $x.push_text(&$e);
        xml!($x; $($rest)*)
    };
    ($x:ident; $strlit:tt $($rest:tt)*) => {
        $x.push_str(&$strlit);
        xml!($x; $($rest)*)
    };
    ($x:ident;) => {};
}

#[test]
fn test_xml_macro_indents() {
    let mut xml = Xml::with_capacity(64);
    let name = "a<b";
    xml!(xml;
        <library_images>;
            <image id=["img"] name=[ESC(name)]>;
                <init_from>"hull.tga"</init_from>;
            /image>;
        /library_images>;
    );
    assert_eq!(
        xml.string(),
        "<library_images>\n  \
           <image id=\"img\" name=\"a&lt;b\">\n    \
             <init_from>hull.tga</init_from>\n  \
           </image>\n\
         </library_images>\n"
    );
}

#[test]
fn test_fragment_splices_at_depth() {
    let mut frag = Xml::with_indent(1);
    xml!(frag;
        <node>;
            <matrix>MATRIX(&::cgmath::One::one())</matrix>;
        /node>;
    );

    let mut xml = Xml::with_capacity(64);
    xml!(xml; <root>;);
    xml.push_fragment(&frag);
    xml!(xml; /root>;);
    assert_eq!(
        xml.string(),
        "<root>\n  <node>\n    \
         <matrix>1 0 0 0 0 1 0 0 0 0 1 0 0 0 0 1</matrix>\n  \
         </node>\n</root>\n"
    );
}
