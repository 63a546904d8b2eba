pub mod router;
pub mod server;

pub use router::{json_response, HttpResponse, PathPattern, Rejection, RouteRequest, Router};
pub use server::{App, AppService, Listener};
