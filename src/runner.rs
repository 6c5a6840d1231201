use crate::codec;
use crate::config::TestRunConfig;
use crate::error::HarnessError;
use crate::matcher::{HttpEnvelope, ResponsePattern};
use crate::sip::SipRequest;
use crate::Result;
use eyre::{eyre, WrapErr};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};
use tokio::time::{sleep, timeout};
use tracing::{debug, info};

/// Bound on every network read; a server that does not answer within this
/// fails the step instead of stalling the suite.
pub const RECV_TIMEOUT: Duration = Duration::from_secs(3);

/// Maximum response size read per exchange.
const MAX_RESPONSE: usize = 1000;

const LOOPBACK: &str = "127.0.0.1";

/// Socket policy for a SIP step. `Dialog` steps share one long-lived
/// socket across the scenario, for exchanges that depend on server-side
/// state correlated to earlier steps; `Fresh` steps are independent
/// queries on a one-shot socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketUse {
    Fresh,
    Dialog,
}

/// One step of a scenario.
pub enum Step {
    Sip {
        label: String,
        request: SipRequest,
        expect: ResponsePattern,
        socket: SocketUse,
    },
    Control {
        label: String,
        body: String,
        expect: ResponsePattern,
    },
    Pause(Duration),
}

/// An ordered sequence of send/expect and wait steps, executed strictly
/// sequentially against one server.
pub struct Scenario {
    pub name: String,
    pub steps: Vec<Step>,
}

impl Scenario {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
        }
    }

    /// Send-and-expect on a one-shot SIP socket.
    pub fn sip(mut self, label: &str, request: SipRequest, expect: ResponsePattern) -> Self {
        self.steps.push(Step::Sip {
            label: label.into(),
            request,
            expect,
            socket: SocketUse::Fresh,
        });
        self
    }

    /// Send-and-expect on the scenario's shared dialog socket.
    pub fn sip_dialog(mut self, label: &str, request: SipRequest, expect: ResponsePattern) -> Self {
        self.steps.push(Step::Sip {
            label: label.into(),
            request,
            expect,
            socket: SocketUse::Dialog,
        });
        self
    }

    /// Send-and-expect over the XML-RPC control channel.
    pub fn control(mut self, label: &str, body: impl Into<String>, expect: ResponsePattern) -> Self {
        self.steps.push(Step::Control {
            label: label.into(),
            body: body.into(),
            expect,
        });
        self
    }

    /// Real-time wait for server-side timers (expiry, GC sweeps).
    pub fn pause(mut self, duration: Duration) -> Self {
        self.steps.push(Step::Pause(duration));
        self
    }
}

/// Executes scenarios against a running server. Holds the shared dialog
/// socket for the duration of one scenario run.
pub struct ScenarioRunner {
    sip_addr: SocketAddr,
    xmlrpc_port: Option<u16>,
    dialog_socket: Option<UdpSocket>,
    envelope: HttpEnvelope,
}

impl ScenarioRunner {
    pub fn new(config: &TestRunConfig) -> Self {
        Self {
            sip_addr: format!("{LOOPBACK}:{}", config.sip_port)
                .parse()
                .expect("loopback address is valid"),
            xmlrpc_port: config.xmlrpc_port,
            dialog_socket: None,
            envelope: HttpEnvelope::default(),
        }
    }

    pub async fn run(&mut self, scenario: &Scenario) -> Result<()> {
        info!(scenario = %scenario.name, steps = scenario.steps.len(), "running scenario");
        for (index, step) in scenario.steps.iter().enumerate() {
            self.run_step(index, step)
                .await
                .wrap_err_with(|| format!("scenario `{}`, step {index}", scenario.name))?;
        }
        Ok(())
    }

    async fn run_step(&mut self, index: usize, step: &Step) -> Result<()> {
        match step {
            Step::Pause(duration) => {
                debug!(?duration, "pausing for server-side timers");
                sleep(*duration).await;
                Ok(())
            }
            Step::Sip {
                label,
                request,
                expect,
                socket,
            } => {
                debug!(step = index, label, "sip exchange");
                let wire = codec::to_wire(&request.render());
                let reply = match socket {
                    SocketUse::Fresh => {
                        let socket = self.connect_sip().await?;
                        Self::exchange(&socket, &wire, index, label).await?
                    }
                    SocketUse::Dialog => {
                        if self.dialog_socket.is_none() {
                            self.dialog_socket = Some(self.connect_sip().await?);
                        }
                        let socket = self.dialog_socket.as_ref().expect("just initialized");
                        Self::exchange(socket, &wire, index, label).await?
                    }
                };
                expect.assert_match(&reply)?;
                Ok(())
            }
            Step::Control {
                label,
                body,
                expect,
            } => {
                debug!(step = index, label, "control exchange");
                let port = self.xmlrpc_port.ok_or_else(|| {
                    eyre!("scenario uses the control channel but no XML-RPC port is configured")
                })?;
                let frame = codec::http_post_frame(body.as_bytes(), LOOPBACK, port);

                let mut stream = TcpStream::connect((LOOPBACK, port)).await?;
                stream.write_all(&frame).await?;

                let mut buf = vec![0u8; MAX_RESPONSE];
                let received = timeout(RECV_TIMEOUT, stream.read(&mut buf))
                    .await
                    .map_err(|_| HarnessError::TransportTimeout {
                        step: index,
                        label: label.clone(),
                        timeout: RECV_TIMEOUT,
                    })??;

                let reply_body = self.envelope.strip(&buf[..received])?;
                expect.assert_match(reply_body)?;
                Ok(())
            }
        }
    }

    async fn connect_sip(&self) -> Result<UdpSocket> {
        let socket = UdpSocket::bind((LOOPBACK, 0)).await?;
        socket.connect(self.sip_addr).await?;
        Ok(socket)
    }

    async fn exchange(socket: &UdpSocket, wire: &[u8], index: usize, label: &str) -> Result<Vec<u8>> {
        socket.send(wire).await?;
        let mut buf = vec![0u8; MAX_RESPONSE];
        let received = timeout(RECV_TIMEOUT, socket.recv(&mut buf))
            .await
            .map_err(|_| HarnessError::TransportTimeout {
                step: index,
                label: label.into(),
                timeout: RECV_TIMEOUT,
            })??;
        buf.truncate(received);
        Ok(buf)
    }
}
