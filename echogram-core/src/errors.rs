/// Basic Error types.
#[derive(Debug)]
pub enum EchoError {
    /// IoError from the std library.
    StdIoError(std::io::Error),
    /// A user-supplied calibration override is neither a scalar nor a vector
    /// of length 1, `n_pings` or the number of requested pings.
    InvalidCalibrationShape {
        param: &'static str,
        len: usize,
        n_pings: usize,
        n_indices: usize,
    },
    /// A channel-number or channel-id lookup missed.
    InvalidChannelSelector { selector: String },
    /// The requested resample rate is not an integer ratio of an input rate.
    InvalidResampleRate { requested: f64, interval: f64 },
    /// A query named a sample property the store does not carry.
    UnknownProperty { name: String },
    /// A caller-supplied ping index exceeds the number of stored pings.
    IndexOutOfRange { idx: usize, n_pings: usize },
    /// A time string did not parse with the configured format.
    InvalidTimeString { input: String, format: String },
    /// An error in the read settings.
    SettingsError { msg: String },
    /// Corruption reported by the datagram parser.
    DatagramParse { msg: String },
    /// Enum creation error.
    ParseEnum { f: String, code: u16 },
    /// Two stores cannot be spliced because their shapes disagree.
    IncompatibleStores { msg: String },
    #[cfg(feature = "to_json")]
    /// Serialisation/Deserialisation error.
    SerdeError(serde_json::Error),
}

impl From<std::io::Error> for EchoError {
    fn from(e: std::io::Error) -> Self {
        Self::StdIoError(e)
    }
}

impl std::fmt::Display for EchoError {
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        use self::EchoError::*;
        match self {
            #[cfg(feature = "to_json")]
            SerdeError(x) => write!(fmt, "{}", x),
            StdIoError(x) => write!(fmt, "{}", x),
            InvalidCalibrationShape { param, len, n_pings, n_indices } => write!(
                fmt,
                "Calibration parameter {} has length {}, but must be scalar or of length 1, {} (pings) or {} (requested pings)",
                param, len, n_pings, n_indices
            ),
            InvalidChannelSelector { selector } => {
                write!(fmt, "No channel matches the selector {}", selector)
            }
            InvalidResampleRate { requested, interval } => write!(
                fmt,
                "Resample interval {}s is not an integer ratio of the recorded interval {}s",
                requested, interval
            ),
            UnknownProperty { name } => {
                write!(fmt, "The store does not carry the sample property {}", name)
            }
            IndexOutOfRange { idx, n_pings } => write!(
                fmt,
                "Ping index {} is out of range for a store of {} pings",
                idx, n_pings
            ),
            InvalidTimeString { input, format } => {
                write!(fmt, "Could not parse {:?} with the time format {:?}", input, format)
            }
            SettingsError { msg } => write!(fmt, "Error in settings: {}", msg),
            DatagramParse { msg } => write!(fmt, "Datagram parse failure: {}", msg),
            ParseEnum { f, code } => write!(fmt, "Could not parse source ({}) to {}.", code, f),
            IncompatibleStores { msg } => write!(fmt, "Stores cannot be combined: {}", msg),
        }
    }
}

impl From<EchoError> for String {
    fn from(e: EchoError) -> String {
        e.to_string()
    }
}

impl std::error::Error for EchoError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        use self::EchoError::*;
        match self {
            #[cfg(feature = "to_json")]
            SerdeError(x) => x.source(),
            StdIoError(x) => x.source(),
            _ => None,
        }
    }
}
