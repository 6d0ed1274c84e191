pub mod facade;
pub mod http;

pub use facade::QueryFacade;
pub use http::{
    create_router, ApiServer, AppState, CurrentBlockResponse, ErrorResponse, StatusResponse,
    SubscribeResponse, TransactionsResponse,
};
