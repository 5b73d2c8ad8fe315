//! The world, the agent conversation and the directive grammar tied together.
//!
//! A turn with the agent runs in three phases: [`Game::begin_turn`] builds
//! the briefing and locks out further inspection, the caller awaits the
//! transport with nothing borrowed from the game, and [`Game::finish_turn`]
//! records the answer and applies its directives.

use anyhow::Result;
use coderip_analysis::markup::DescriptorToken;
use coderip_protocol::DirectiveGrammar;

use crate::config::GameConfig;
use crate::dialogue::briefing::build_briefing;
use crate::dialogue::transport::{send_with_retry, ChatTransport, RetryPolicy};
use crate::dialogue::{ChatRequest, DialogueSession, TurnResolution, TurnTicket};
use crate::disclosure::resolve_display_name;
use crate::discovery::DiscoveryRecord;
use crate::entitlement::{unlock, KeyPolicy, UnlockOutcome};
use crate::error::{CollectError, TransportError, TurnError, UnlockError};
use crate::inventory::CollectOutcome;
use crate::patch::{apply_agent_text, AppliedMessage};
use crate::world::scenario::populate_stage_one;
use crate::world::World;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    Answered {
        reply: String,
        applied: AppliedMessage,
    },
    Failed(TransportError),
    /// The answer belonged to an abandoned turn and was dropped.
    Discarded,
}

#[derive(Debug)]
pub struct Game {
    config: GameConfig,
    world: World,
    session: DialogueSession,
    grammar: DirectiveGrammar,
    policy: KeyPolicy,
}

impl Game {
    pub fn new(config: GameConfig) -> Result<Self> {
        let mut world = World::new(&config.world)?;
        if config.world.load_stage_one {
            populate_stage_one(&mut world)?;
        }
        Ok(Self {
            session: DialogueSession::new(&config.agent),
            grammar: config.directive.grammar(),
            policy: KeyPolicy::default(),
            world,
            config,
        })
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    pub fn session(&self) -> &DialogueSession {
        &self.session
    }

    pub fn grammar(&self) -> &DirectiveGrammar {
        &self.grammar
    }

    pub fn policy(&self) -> &KeyPolicy {
        &self.policy
    }

    pub fn set_policy(&mut self, policy: KeyPolicy) {
        self.policy = policy;
    }

    pub fn briefing(&self) -> String {
        build_briefing(&self.config.agent.persona, &self.grammar, &self.world)
    }

    /// Discover an object. Refused while the agent is answering, since the
    /// agent reasons about the projection it was sent.
    pub fn inspect(&mut self, object: &str) -> Result<DiscoveryRecord, TurnError> {
        if let Some(ticket) = self.session.in_flight() {
            return Err(match &ticket.analyzing {
                Some(analyzing) => TurnError::AnalysisInFlight {
                    object: analyzing.clone(),
                },
                None => TurnError::TurnInFlight,
            });
        }
        self.world
            .inspect(object)
            .cloned()
            .map_err(|_| TurnError::UnknownObject(object.to_string()))
    }

    pub fn begin_turn(
        &mut self,
        user_text: String,
        analyzing: Option<String>,
    ) -> Result<(TurnTicket, ChatRequest), TurnError> {
        let briefing = self.briefing();
        self.session.begin_turn(briefing, user_text, analyzing)
    }

    /// Record the transport result and apply any directives in the answer.
    pub fn finish_turn(
        &mut self,
        ticket: &TurnTicket,
        result: Result<String, TransportError>,
    ) -> TurnOutcome {
        match self.session.finish_turn(ticket, result) {
            TurnResolution::Answered(reply) => {
                let applied = self.apply(&reply);
                TurnOutcome::Answered { reply, applied }
            }
            TurnResolution::Failed(error) => TurnOutcome::Failed(error),
            TurnResolution::Stale => TurnOutcome::Discarded,
        }
    }

    pub fn cancel_turn(&mut self) -> Option<TurnTicket> {
        self.session.cancel_turn()
    }

    /// Send one message and handle the answer.
    pub async fn run_turn<T>(
        &mut self,
        transport: &T,
        user_text: String,
        analyzing: Option<String>,
    ) -> Result<TurnOutcome, TurnError>
    where
        T: ChatTransport + ?Sized,
    {
        let (ticket, request) = self.begin_turn(user_text, analyzing)?;
        let policy = RetryPolicy::from(&self.config.agent);
        let result = send_with_retry(transport, &request, policy).await;
        Ok(self.finish_turn(&ticket, result))
    }

    /// Inspect an object and ask the agent to look at it.
    pub async fn analyze<T>(
        &mut self,
        transport: &T,
        object: &str,
    ) -> Result<(DiscoveryRecord, TurnOutcome), TurnError>
    where
        T: ChatTransport + ?Sized,
    {
        let record = self.inspect(object)?;
        let text = format!(
            "I just inspected {} ({}). What can you tell me about its code?",
            record.object, record.kind
        );
        let outcome = self
            .run_turn(transport, text, Some(record.object.clone()))
            .await?;
        Ok((record, outcome))
    }

    /// Send the last unanswered message again.
    pub async fn retry<T>(&mut self, transport: &T) -> Result<TurnOutcome, TurnError>
    where
        T: ChatTransport + ?Sized,
    {
        let text = self.session.take_pending()?;
        self.run_turn(transport, text, None).await
    }

    /// Apply directives written by hand, as if the agent had sent them.
    pub fn apply(&mut self, text: &str) -> AppliedMessage {
        let validate = self.config.directive.validate_syntax;
        apply_agent_text(&mut self.world, &self.grammar, text, validate)
    }

    pub fn unlock(
        &mut self,
        object: &str,
        shown: &str,
        key: &str,
    ) -> Result<UnlockOutcome, UnlockError> {
        unlock(&mut self.world, &self.policy, object, shown, key)
    }

    /// Pick up every token in a readable description.
    pub fn collect(
        &mut self,
        object: &str,
        shown: &str,
    ) -> Result<Vec<(DescriptorToken, CollectOutcome)>, CollectError> {
        let entity = self
            .world
            .object(object)
            .ok_or_else(|| CollectError::UnknownObject {
                object: object.to_string(),
            })?;
        let entry = resolve_display_name(&entity.behaviors, shown).ok_or_else(|| {
            CollectError::UnknownFunction {
                object: object.to_string(),
                shown: shown.to_string(),
            }
        })?;
        if !entry.permission.shows_body() {
            return Err(CollectError::Hidden {
                object: object.to_string(),
                shown: shown.to_string(),
            });
        }
        let tokens = entry
            .description
            .as_deref()
            .map(coderip_analysis::markup::extract_tokens)
            .unwrap_or_default();
        let inventory = self.world.inventory_mut();
        Ok(tokens
            .into_iter()
            .map(|token| {
                let outcome = inventory.collect(token.clone());
                (token, outcome)
            })
            .collect())
    }
}
