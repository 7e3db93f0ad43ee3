error_chain! {
    foreign_links {
        Fmt(::std::fmt::Error);
        Io(::std::io::Error);
        TimeFmt(::time::ParseError);
        Xml(::roxmltree::Error);
        ParseFloat(::std::num::ParseFloatError);
        ParseInt(::std::num::ParseIntError);
    }

    errors {
        NoDestination {
            description("no destination path")
            display("no destination path was given for the export")
        }
        BadLevelLine(line_no: usize, line: String) {
            description("malformed .level command")
            display("malformed .level command on line {}: {}", line_no, line)
        }
        BadDae(msg: String) {
            description("malformed COLLADA document")
            display("malformed COLLADA document: {}", msg)
        }
    }
}

macro_rules! check {
    ($b:expr) => {
        if !$b {
            use crate::errors::Error;
            use crate::errors::ErrorKind;
            Err(Error::from_kind(ErrorKind::Msg(format!(
                "expected: {}",
                stringify!($b)
            ))))
        } else {
            Ok(())
        }
    };
}

/// Shorthand for bailing out of the reader with a `BadDae` error.
macro_rules! bad_dae {
    ($($arg:tt)*) => {
        return Err(crate::errors::ErrorKind::BadDae(format!($($arg)*)).into())
    };
}
