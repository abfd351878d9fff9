//! Query construction, replica fanout and result validation.

pub mod builder;
pub mod fanout;
pub mod mock;
pub mod transport;
pub mod validator;
pub mod window;

pub use builder::{QueryBuildError, QueryBuilder};
pub use fanout::{EndpointError, EndpointErrors, FanoutEngine, FanoutError, FanoutMode, FanoutResult};
pub use mock::{MockResponse, MockTransport};
pub use transport::{BodyRead, EndpointResponse, HttpTransport, QueryTransport, TransportError};
pub use validator::{
    PromQueryData, PromQueryMatrix, PromQueryResult, ResultValidator, Sample, ValidationError,
    ValidationReport,
};
pub use window::{QueryWindow, WindowDecodeError};
