//! # Transport
//!
//! [reqwest] backed HTTP collaborator for [Poster](crate::Poster)
//!
//! *this module requires the `reqwest` feature flag*

use bytes::Bytes;
use futures::future::BoxFuture;
use http::{Request, Response};
use std::task::{Context, Poll};

/// [tower::Service] that executes requests on a shared [reqwest::Client]
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, reqwest::Error> {
        Ok(Self::from(reqwest::Client::builder().build()?))
    }
}

impl From<reqwest::Client> for ReqwestTransport {
    fn from(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl tower::Service<Request<Bytes>> for ReqwestTransport {
    type Response = Response<Bytes>;
    type Error = reqwest::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: Request<Bytes>) -> Self::Future {
        let client = self.client.clone();
        Box::pin(async move {
            let response = client.execute(reqwest::Request::try_from(request)?).await?;
            let status = response.status();
            let body = response.bytes().await?;

            let mut response = Response::new(body);
            *response.status_mut() = status;
            Ok(response)
        })
    }
}
