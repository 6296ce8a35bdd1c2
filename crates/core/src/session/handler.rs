use crate::error::{Result, WebRtspError};
use crate::protocol::{Message, Method, Request, Response};

use super::Session;

/// Per-method hooks for one session role.
///
/// Request hooks default to "unsupported", which is fatal to the
/// connection. Response hooks receive the original request recovered from
/// the outstanding table and default to accepting any 2xx status.
///
/// An `Err` from any hook means the connection must be closed; the owner
/// does that by calling [`Session::disconnect`].
pub trait MethodHandler {
    fn session(&self) -> &Session;

    fn session_mut(&mut self) -> &mut Session;

    fn on_options_request(&mut self, request: Request) -> Result<()> {
        unsupported(&request)
    }

    fn on_list_request(&mut self, request: Request) -> Result<()> {
        unsupported(&request)
    }

    fn on_describe_request(&mut self, request: Request) -> Result<()> {
        unsupported(&request)
    }

    fn on_setup_request(&mut self, request: Request) -> Result<()> {
        unsupported(&request)
    }

    fn on_play_request(&mut self, request: Request) -> Result<()> {
        unsupported(&request)
    }

    fn on_record_request(&mut self, request: Request) -> Result<()> {
        unsupported(&request)
    }

    fn on_subscribe_request(&mut self, request: Request) -> Result<()> {
        unsupported(&request)
    }

    fn on_teardown_request(&mut self, request: Request) -> Result<()> {
        unsupported(&request)
    }

    fn on_get_parameter_request(&mut self, request: Request) -> Result<()> {
        unsupported(&request)
    }

    fn on_set_parameter_request(&mut self, request: Request) -> Result<()> {
        unsupported(&request)
    }

    fn on_options_response(&mut self, request: Request, response: Response) -> Result<()> {
        expect_success(&request, &response)
    }

    fn on_list_response(&mut self, request: Request, response: Response) -> Result<()> {
        expect_success(&request, &response)
    }

    fn on_describe_response(&mut self, request: Request, response: Response) -> Result<()> {
        expect_success(&request, &response)
    }

    fn on_setup_response(&mut self, request: Request, response: Response) -> Result<()> {
        expect_success(&request, &response)
    }

    fn on_play_response(&mut self, request: Request, response: Response) -> Result<()> {
        expect_success(&request, &response)
    }

    fn on_record_response(&mut self, request: Request, response: Response) -> Result<()> {
        expect_success(&request, &response)
    }

    fn on_subscribe_response(&mut self, request: Request, response: Response) -> Result<()> {
        expect_success(&request, &response)
    }

    fn on_teardown_response(&mut self, request: Request, response: Response) -> Result<()> {
        expect_success(&request, &response)
    }

    fn on_get_parameter_response(&mut self, request: Request, response: Response) -> Result<()> {
        expect_success(&request, &response)
    }

    fn on_set_parameter_response(&mut self, request: Request, response: Response) -> Result<()> {
        expect_success(&request, &response)
    }

    fn handle_request(&mut self, request: Request) -> Result<()> {
        dispatch_request(self, request)
    }

    /// Match `response` to its outstanding request and dispatch on the
    /// request's method. Unknown or already answered CSeqs fail.
    fn handle_response(&mut self, response: Response) -> Result<()> {
        let request = self.session_mut().take_outstanding(response.cseq)?;
        tracing::debug!(
            cseq = response.cseq,
            method = %request.method,
            status = response.status_code,
            "response in"
        );
        dispatch_response(self, request, response)
    }

    /// Parse one transport frame and handle it.
    fn handle_message(&mut self, buf: &[u8]) -> Result<()> {
        match Message::parse(buf)? {
            Message::Request(request) => {
                tracing::debug!(cseq = request.cseq, method = %request.method, uri = %request.uri, "request in");
                self.handle_request(request)
            }
            Message::Response(response) => self.handle_response(response),
        }
    }
}

/// Route a request to its hook. Roles that override
/// [`MethodHandler::handle_request`] call this after their own checks.
pub fn dispatch_request<H: MethodHandler + ?Sized>(handler: &mut H, request: Request) -> Result<()> {
    match request.method {
        Method::Options => handler.on_options_request(request),
        Method::List => handler.on_list_request(request),
        Method::Describe => handler.on_describe_request(request),
        Method::Setup => handler.on_setup_request(request),
        Method::Play => handler.on_play_request(request),
        Method::Record => handler.on_record_request(request),
        Method::Subscribe => handler.on_subscribe_request(request),
        Method::Teardown => handler.on_teardown_request(request),
        Method::GetParameter => handler.on_get_parameter_request(request),
        Method::SetParameter => handler.on_set_parameter_request(request),
    }
}

pub fn dispatch_response<H: MethodHandler + ?Sized>(
    handler: &mut H,
    request: Request,
    response: Response,
) -> Result<()> {
    match request.method {
        Method::Options => handler.on_options_response(request, response),
        Method::List => handler.on_list_response(request, response),
        Method::Describe => handler.on_describe_response(request, response),
        Method::Setup => handler.on_setup_response(request, response),
        Method::Play => handler.on_play_response(request, response),
        Method::Record => handler.on_record_response(request, response),
        Method::Subscribe => handler.on_subscribe_response(request, response),
        Method::Teardown => handler.on_teardown_response(request, response),
        Method::GetParameter => handler.on_get_parameter_response(request, response),
        Method::SetParameter => handler.on_set_parameter_response(request, response),
    }
}

pub fn unsupported(request: &Request) -> Result<()> {
    tracing::warn!(method = %request.method, uri = %request.uri, cseq = request.cseq, "unsupported request");
    Err(WebRtspError::Unsupported {
        method: request.method,
        uri: request.uri.clone(),
    })
}

pub fn expect_success(request: &Request, response: &Response) -> Result<()> {
    if response.is_success() {
        Ok(())
    } else {
        tracing::warn!(method = %request.method, status = response.status_code, "request failed");
        Err(WebRtspError::RequestFailed {
            method: request.method,
            status: response.status_code,
        })
    }
}
