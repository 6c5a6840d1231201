use crate::matcher::{digits, host_addr, lit, one_of, token, ResponsePattern};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SipMethod {
    Register,
    Options,
}

impl SipMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            SipMethod::Register => "REGISTER",
            SipMethod::Options => "OPTIONS",
        }
    }
}

/// Contact header of a request: a concrete URI, or the wildcard form used
/// by a remove-all registration.
#[derive(Debug, Clone)]
pub enum Contact {
    Uri(String),
    Wildcard,
}

/// One SIP request, rendered from typed fields into the logical-newline
/// template form consumed by [`crate::codec::to_wire`].
///
/// Header order matches what the server-under-test is exercised with:
/// Via, Max-Forwards, To, From, Call-ID, CSeq, optional Contact, optional
/// Accept, Content-Length, optional Expires, User-Agent.
#[derive(Debug, Clone)]
pub struct SipRequest {
    method: SipMethod,
    request_uri: String,
    via_host: String,
    branch: String,
    max_forwards: u32,
    to_uri: String,
    from_display: String,
    from_uri: String,
    from_tag: String,
    call_id: String,
    cseq: u32,
    contact: Option<Contact>,
    expires: Option<u32>,
    accept: Option<String>,
    user_agent: String,
}

impl SipRequest {
    pub fn new(method: SipMethod, request_uri: impl Into<String>) -> Self {
        Self {
            method,
            request_uri: request_uri.into(),
            via_host: "127.0.0.1:56201".into(),
            branch: "z9hG4bK4e8a17c0d3b2f581".into(),
            max_forwards: 6,
            to_uri: String::new(),
            from_display: String::new(),
            from_uri: String::new(),
            from_tag: String::new(),
            call_id: String::new(),
            cseq: 1,
            contact: None,
            expires: None,
            accept: None,
            user_agent: concat!("sipconform/", env!("CARGO_PKG_VERSION")).into(),
        }
    }

    pub fn to_uri(mut self, uri: impl Into<String>) -> Self {
        self.to_uri = uri.into();
        self
    }

    pub fn from_party(
        mut self,
        display: impl Into<String>,
        uri: impl Into<String>,
        tag: impl Into<String>,
    ) -> Self {
        self.from_display = display.into();
        self.from_uri = uri.into();
        self.from_tag = tag.into();
        self
    }

    pub fn call_id(mut self, call_id: impl Into<String>) -> Self {
        self.call_id = call_id.into();
        self
    }

    pub fn cseq(mut self, cseq: u32) -> Self {
        self.cseq = cseq;
        self
    }

    pub fn contact(mut self, uri: impl Into<String>) -> Self {
        self.contact = Some(Contact::Uri(uri.into()));
        self
    }

    pub fn contact_wildcard(mut self) -> Self {
        self.contact = Some(Contact::Wildcard);
        self
    }

    pub fn expires(mut self, seconds: u32) -> Self {
        self.expires = Some(seconds);
        self
    }

    pub fn accept(mut self, media_type: impl Into<String>) -> Self {
        self.accept = Some(media_type.into());
        self
    }

    // Accessors used to re-derive logical fields from a built request.

    pub fn method(&self) -> SipMethod {
        self.method
    }

    pub fn call_id_value(&self) -> &str {
        &self.call_id
    }

    pub fn cseq_value(&self) -> u32 {
        self.cseq
    }

    /// Renders the request as template text with logical `\n` terminators,
    /// ending in the blank line that closes the header block.
    pub fn render(&self) -> String {
        let mut out = String::with_capacity(512);
        out.push_str(&format!(
            "{} {} SIP/2.0\n",
            self.method.as_str(),
            self.request_uri
        ));
        out.push_str(&format!(
            "Via: SIP/2.0/UDP {};branch={};rport\n",
            self.via_host, self.branch
        ));
        out.push_str(&format!("Max-Forwards: {}\n", self.max_forwards));
        out.push_str(&format!("To: <{}>\n", self.to_uri));
        out.push_str(&format!(
            "From: {} <{}>;tag={}\n",
            self.from_display, self.from_uri, self.from_tag
        ));
        out.push_str(&format!("Call-ID: {}\n", self.call_id));
        out.push_str(&format!("CSeq: {} {}\n", self.cseq, self.method.as_str()));
        match &self.contact {
            Some(Contact::Uri(uri)) => out.push_str(&format!("Contact: <{uri}>\n")),
            Some(Contact::Wildcard) => out.push_str("Contact: *\n"),
            None => {}
        }
        if let Some(accept) = &self.accept {
            out.push_str(&format!("Accept: {accept}\n"));
        }
        out.push_str("Content-Length: 0\n");
        if let Some(expires) = self.expires {
            out.push_str(&format!("Expires: {expires}\n"));
        }
        out.push_str(&format!("User-Agent: {}\n", self.user_agent));
        out.push('\n');
        out
    }

    /// Expected 200 OK echoing this request's routing and correlation
    /// headers, with wildcards for the server-assigned fields: the `rport`
    /// retransmission counter, the `received` address and the `To` tag.
    pub fn expect_ok(&self) -> OkPattern {
        OkPattern {
            via_host: self.via_host.clone(),
            branch: self.branch.clone(),
            to_uri: self.to_uri.clone(),
            from_display: self.from_display.clone(),
            from_uri: self.from_uri.clone(),
            from_tag: self.from_tag.clone(),
            call_id: self.call_id.clone(),
            cseq: self.cseq,
            method: self.method,
            contact: None,
        }
    }
}

/// Expectation for the Contact header a binding query reports back.
#[derive(Debug, Clone)]
pub struct ContactExpectation {
    /// Contact URI as the server reports it (transport annotation included)
    pub uri: String,
    /// Whether the server encloses the URI in angle brackets
    pub bracketed: bool,
    /// Accepted remaining-lifetime values for the `expires` parameter
    pub expires_any_of: Vec<String>,
}

/// Builder for the 200 OK response pattern of one request.
#[derive(Debug, Clone)]
pub struct OkPattern {
    via_host: String,
    branch: String,
    to_uri: String,
    from_display: String,
    from_uri: String,
    from_tag: String,
    call_id: String,
    cseq: u32,
    method: SipMethod,
    contact: Option<ContactExpectation>,
}

impl OkPattern {
    pub fn with_contact(mut self, contact: ContactExpectation) -> Self {
        self.contact = Some(contact);
        self
    }

    pub fn compile(self) -> eyre::Result<ResponsePattern> {
        let mut builder = ResponsePattern::builder()
            .lit_line("SIP/2.0 200 OK")
            .line([
                lit(format!(
                    "Via: SIP/2.0/UDP {};branch={};rport=",
                    self.via_host, self.branch
                )),
                digits(),
                lit(";received="),
                host_addr(),
            ])
            .line([lit(format!("To: <{}>;tag=", self.to_uri)), token()])
            .line([lit(format!(
                "From: {} <{}>;tag={}",
                self.from_display, self.from_uri, self.from_tag
            ))])
            .lit_line(format!("Call-ID: {}", self.call_id))
            .lit_line(format!("CSeq: {} {}", self.cseq, self.method.as_str()));

        if let Some(contact) = self.contact {
            let uri = if contact.bracketed {
                format!("Contact: <{}>;expires=", contact.uri)
            } else {
                format!("Contact: {};expires=", contact.uri)
            };
            builder = builder.line([lit(uri), one_of(contact.expires_any_of)]);
        }

        builder
            .lit_line("Content-Length: 0")
            .blank_line()
            .compile()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query_request() -> SipRequest {
        SipRequest::new(SipMethod::Register, "sip:127.0.0.1")
            .to_uri("sip:monitoring@127.0.0.1")
            .from_party("monit", "sip:monit@127.0.0.1", "5c21da0f77b3e9a4")
            .call_id("9f30c2ab51d6e874")
            .cseq(20731)
    }

    #[test]
    fn register_query_renders_expected_template() {
        let rendered = query_request().render();
        let expected = format!(
            "REGISTER sip:127.0.0.1 SIP/2.0\n\
             Via: SIP/2.0/UDP 127.0.0.1:56201;branch=z9hG4bK4e8a17c0d3b2f581;rport\n\
             Max-Forwards: 6\n\
             To: <sip:monitoring@127.0.0.1>\n\
             From: monit <sip:monit@127.0.0.1>;tag=5c21da0f77b3e9a4\n\
             Call-ID: 9f30c2ab51d6e874\n\
             CSeq: 20731 REGISTER\n\
             Content-Length: 0\n\
             User-Agent: sipconform/{}\n\n",
            env!("CARGO_PKG_VERSION")
        );
        assert_eq!(rendered, expected);
    }

    #[test]
    fn register_with_binding_renders_contact_and_expires() {
        let rendered = query_request()
            .cseq(20733)
            .contact("sip:127.0.0.1:56201")
            .expires(5)
            .render();
        assert!(rendered.contains("Contact: <sip:127.0.0.1:56201>\n"));
        // Expires goes after Content-Length, as the server is exercised with.
        let cl = rendered.find("Content-Length: 0").unwrap();
        let exp = rendered.find("Expires: 5").unwrap();
        assert!(exp > cl);
    }

    #[test]
    fn wildcard_contact_renders_star() {
        let rendered = query_request().contact_wildcard().expires(0).render();
        assert!(rendered.contains("Contact: *\n"));
        assert!(rendered.contains("Expires: 0\n"));
    }

    #[test]
    fn options_renders_accept_before_content_length() {
        let rendered = SipRequest::new(SipMethod::Options, "sip:monitoring@voip.example.local")
            .to_uri("sip:monitoring@voip.example.local")
            .from_party("monit", "sip:monit@127.0.0.1", "5c21da0f77b3e9a4")
            .call_id("9f30c2ab51d6e874")
            .cseq(20731)
            .contact("sip:127.0.0.1:56201")
            .accept("application/sdp")
            .render();
        let accept = rendered.find("Accept: application/sdp").unwrap();
        let cl = rendered.find("Content-Length: 0").unwrap();
        assert!(accept < cl);
        assert!(rendered.starts_with("OPTIONS sip:monitoring@voip.example.local SIP/2.0\n"));
    }

    #[test]
    fn logical_fields_survive_the_round_trip() {
        let request = query_request();
        // The builder's accessors must report the literal values supplied,
        // independent of how the template is later normalized.
        assert_eq!(request.method(), SipMethod::Register);
        assert_eq!(request.call_id_value(), "9f30c2ab51d6e874");
        assert_eq!(request.cseq_value(), 20731);

        let wire = crate::codec::to_wire(&request.render());
        let text = String::from_utf8(wire.to_vec()).unwrap();
        assert!(text.contains("Call-ID: 9f30c2ab51d6e874\r\n"));
        assert!(text.contains("CSeq: 20731 REGISTER\r\n"));
    }

    #[test]
    fn ok_pattern_matches_server_style_response() {
        let pattern = query_request().expect_ok().compile().unwrap();
        let response = b"SIP/2.0 200 OK\r\n\
Via: SIP/2.0/UDP 127.0.0.1:56201;branch=z9hG4bK4e8a17c0d3b2f581;rport=3;received=127.0.0.1\r\n\
To: <sip:monitoring@127.0.0.1>;tag=7C3A-9\r\n\
From: monit <sip:monit@127.0.0.1>;tag=5c21da0f77b3e9a4\r\n\
Call-ID: 9f30c2ab51d6e874\r\n\
CSeq: 20731 REGISTER\r\n\
Content-Length: 0\r\n\r\n";
        assert!(pattern.matches(response));
    }

    #[test]
    fn ok_pattern_tolerates_any_rport_counter() {
        let pattern = query_request().expect_ok().compile().unwrap();
        for rport in ["1", "8", "473"] {
            let response = format!(
                "SIP/2.0 200 OK\r\n\
Via: SIP/2.0/UDP 127.0.0.1:56201;branch=z9hG4bK4e8a17c0d3b2f581;rport={rport};received=127.0.0.1\r\n\
To: <sip:monitoring@127.0.0.1>;tag=ABC\r\n\
From: monit <sip:monit@127.0.0.1>;tag=5c21da0f77b3e9a4\r\n\
Call-ID: 9f30c2ab51d6e874\r\n\
CSeq: 20731 REGISTER\r\n\
Content-Length: 0\r\n\r\n"
            );
            assert!(pattern.matches(response.as_bytes()), "rport={rport}");
        }
    }

    #[test]
    fn ok_pattern_with_contact_checks_remaining_lifetime() {
        let pattern = query_request()
            .expect_ok()
            .with_contact(ContactExpectation {
                uri: "sip:127.0.0.1:56201;transport=udp".into(),
                bracketed: true,
                expires_any_of: vec!["4".into(), "5".into()],
            })
            .compile()
            .unwrap();
        let response = b"SIP/2.0 200 OK\r\n\
Via: SIP/2.0/UDP 127.0.0.1:56201;branch=z9hG4bK4e8a17c0d3b2f581;rport=2;received=127.0.0.1\r\n\
To: <sip:monitoring@127.0.0.1>;tag=ABC\r\n\
From: monit <sip:monit@127.0.0.1>;tag=5c21da0f77b3e9a4\r\n\
Call-ID: 9f30c2ab51d6e874\r\n\
CSeq: 20731 REGISTER\r\n\
Contact: <sip:127.0.0.1:56201;transport=udp>;expires=4\r\n\
Content-Length: 0\r\n\r\n";
        assert!(pattern.matches(response));

        let stale = response.to_vec();
        let stale = String::from_utf8(stale).unwrap().replace("expires=4", "expires=0");
        assert!(!pattern.matches(stale.as_bytes()));
    }
}
