mod message;
pub use message::Message;
pub use message::PayloadItem;
pub use message::PayloadSize;

mod request;
pub use request::ClientInfo;
pub use request::ReqBody;
pub use request::Request;
pub use request::RequestHeader;

mod response;
pub use response::canned_response;
pub use response::Response;
pub use response::ResponseBody;
pub use response::ResponseClass;
pub use response::ResponseHead;

mod error;
pub use error::HttpError;
pub use error::ParseError;
pub use error::SendError;
