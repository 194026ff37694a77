//! WebRTC transport: one `str0m::Rtc` instance per publisher, driven by a
//! dedicated task so the sans-IO state machine is never touched from two
//! places at once. Callers talk to it through a small command channel,
//! narrowed to a single peer per transport so the negotiated media's RTP
//! is actually forwarded out, not just negotiated and dropped.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use str0m::change::SdpOffer;
use str0m::media::{MediaKind, Mid};
use str0m::net::{Protocol, Receive};
use str0m::{Candidate, Event, Input, Output, Rtc};
use tokio::net::UdpSocket;
use tokio::sync::{broadcast, mpsc, oneshot};
use uuid::Uuid;

use crate::error::SfuError;
use crate::producer_consumer::Producer;
use crate::rtp::Packetizer;

enum TransportCommand {
    Negotiate {
        offer_sdp: String,
        reply: oneshot::Sender<Result<String, SfuError>>,
    },
    Produce {
        reply: oneshot::Sender<Result<Producer, SfuError>>,
    },
    Close,
}

/// A publisher-facing WebRTC transport. `connect` performs the SDP
/// offer/answer exchange (str0m negotiates ICE and DTLS within it, so this
/// single call stands in for the mediasoup-style `connectTransport` step);
/// `produce` returns a handle to the negotiated audio track once available.
#[derive(Clone)]
pub struct WebRtcTransport {
    pub id: String,
    cmd_tx: mpsc::Sender<TransportCommand>,
}

impl WebRtcTransport {
    pub fn create(announced_ip: &str) -> Result<Self, SfuError> {
        let id = Uuid::new_v4().to_string();
        let (cmd_tx, cmd_rx) = mpsc::channel(32);
        let announced_ip = announced_ip.to_string();
        let task_id = id.clone();

        tokio::spawn(async move {
            if let Err(err) = run_transport(task_id.clone(), announced_ip, cmd_rx).await {
                tracing::error!(transport = %task_id, error = %err, "webrtc transport loop exited with error");
            }
        });

        Ok(Self { id, cmd_tx })
    }

    pub async fn connect(&self, offer_sdp: String) -> Result<String, SfuError> {
        let (reply, rx) = oneshot::channel();
        self.cmd_tx
            .send(TransportCommand::Negotiate { offer_sdp, reply })
            .await
            .map_err(|_| SfuError::TransportClosed)?;
        rx.await.map_err(|_| SfuError::TransportClosed)?
    }

    pub async fn produce(&self) -> Result<Producer, SfuError> {
        let (reply, rx) = oneshot::channel();
        self.cmd_tx
            .send(TransportCommand::Produce { reply })
            .await
            .map_err(|_| SfuError::TransportClosed)?;
        rx.await.map_err(|_| SfuError::TransportClosed)?
    }

    pub async fn close(&self) {
        let _ = self.cmd_tx.send(TransportCommand::Close).await;
    }
}

struct NegotiatedAudio {
    mid: Mid,
    payload_type: u8,
    clock_rate: u32,
    channels: u8,
}

async fn run_transport(
    id: String,
    announced_ip: String,
    mut cmd_rx: mpsc::Receiver<TransportCommand>,
) -> Result<(), SfuError> {
    let socket = UdpSocket::bind((announced_ip.as_str(), 0)).await?;
    let local_addr = socket.local_addr()?;

    let mut rtc = Rtc::builder().set_ice_lite(true).build(Instant::now());
    let candidate = Candidate::host(local_addr, Protocol::Udp).map_err(|e| SfuError::Sdp(e.to_string()))?;
    rtc.add_local_candidate(candidate);

    let mut audio: Option<NegotiatedAudio> = None;
    let mut packetizer: Option<Packetizer> = None;
    let mut producer_tx: Option<broadcast::Sender<Arc<Vec<u8>>>> = None;
    let mut rtp_timestamp: u32 = rand::random();

    let mut recv_buf = vec![0u8; 2048];
    let mut next_timeout = Instant::now();

    loop {
        match rtc.poll_output().map_err(|e| SfuError::Sdp(e.to_string()))? {
            Output::Timeout(t) => next_timeout = t,
            Output::Transmit(t) => {
                let _ = socket.send_to(&t.contents, t.destination).await;
                continue;
            }
            Output::Event(event) => {
                handle_event(&rtc, event, &mut audio, &mut packetizer, &producer_tx, &mut rtp_timestamp);
                continue;
            }
        }

        let sleep_for = next_timeout.saturating_duration_since(Instant::now());

        tokio::select! {
            _ = tokio::time::sleep(sleep_for) => {
                if rtc.handle_input(Input::Timeout(Instant::now())).is_err() {
                    return Ok(());
                }
            }
            received = socket.recv_from(&mut recv_buf) => {
                if !handle_datagram(&mut rtc, received, local_addr, &recv_buf) {
                    return Ok(());
                }
            }
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(TransportCommand::Negotiate { offer_sdp, reply }) => {
                        let result = negotiate(&mut rtc, &offer_sdp);
                        let _ = reply.send(result);
                    }
                    Some(TransportCommand::Produce { reply }) => {
                        let result = match &audio {
                            Some(negotiated) => {
                                let (producer, tx) = Producer::new(
                                    negotiated.payload_type,
                                    negotiated.clock_rate,
                                    negotiated.channels,
                                );
                                packetizer = Some(Packetizer::new(rand::random(), negotiated.payload_type));
                                producer_tx = Some(tx);
                                Ok(producer)
                            }
                            None => Err(SfuError::NoNegotiatedMedia),
                        };
                        let _ = reply.send(result);
                    }
                    Some(TransportCommand::Close) | None => return Ok(()),
                }
            }
        }
    }
}

fn handle_datagram(
    rtc: &mut Rtc,
    received: std::io::Result<(usize, SocketAddr)>,
    local_addr: SocketAddr,
    buf: &[u8],
) -> bool {
    match received {
        Ok((len, source)) => {
            let contents = match (&buf[..len]).try_into() {
                Ok(contents) => contents,
                Err(_) => return true,
            };
            let input = Input::Receive(
                Instant::now(),
                Receive {
                    proto: Protocol::Udp,
                    source,
                    destination: local_addr,
                    contents,
                },
            );
            rtc.handle_input(input).is_ok()
        }
        Err(err) => {
            tracing::warn!(error = %err, "webrtc transport udp recv error");
            true
        }
    }
}

fn negotiate(rtc: &mut Rtc, offer_sdp: &str) -> Result<String, SfuError> {
    let offer = SdpOffer::from_sdp_string(offer_sdp).map_err(|e| SfuError::Sdp(e.to_string()))?;
    let answer = rtc.sdp_api().accept_offer(offer).map_err(|e| SfuError::Sdp(e.to_string()))?;
    Ok(answer.to_sdp_string())
}

/// Opus is framed at 20ms by this pipeline's downstream expectations; at
/// 48kHz that's 960 samples per RTP timestamp tick.
const OPUS_SAMPLES_PER_FRAME: u32 = 960;

fn handle_event(
    rtc: &Rtc,
    event: Event,
    audio: &mut Option<NegotiatedAudio>,
    packetizer: &mut Option<Packetizer>,
    producer_tx: &Option<broadcast::Sender<Arc<Vec<u8>>>>,
    rtp_timestamp: &mut u32,
) {
    match event {
        Event::MediaAdded(media) if media.kind == MediaKind::Audio => {
            let mut payload_type = 111u8;
            for params in rtc.codec_config().params() {
                if params.spec().codec == str0m::format::Codec::Opus {
                    payload_type = u8::from(params.pt());
                    break;
                }
            }
            *audio = Some(NegotiatedAudio {
                mid: media.mid,
                payload_type,
                clock_rate: 48_000,
                channels: 2,
            });
            tracing::debug!(mid = ?media.mid, payload_type, "negotiated inbound audio track");
        }
        Event::MediaData(data) => {
            let Some(negotiated) = audio.as_ref() else { return };
            if data.mid != negotiated.mid {
                return;
            }
            let Some(tx) = producer_tx else { return };
            let Some(pktz) = packetizer else { return };

            let packet = pktz.packetize(&data.data, *rtp_timestamp, false);
            *rtp_timestamp = rtp_timestamp.wrapping_add(OPUS_SAMPLES_PER_FRAME);
            let _ = tx.send(Arc::new(packet));
        }
        other => {
            tracing::trace!(?other, "unhandled str0m event");
        }
    }
}
