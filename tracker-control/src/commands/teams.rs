use std::fmt;

use tracker_store::Team;

use crate::{
    command::{Command, Confirmable, Session},
    error::ControlError,
    reply::Reply,
};

fn find_team(session: &Session<'_>, slug: &str, reply: &mut Reply) -> Result<Option<Team>, ControlError> {
    let team = session.store().team(slug)?;
    if team.is_none() {
        reply.error(format_args!("Team with the slug \"{slug}\" does not exist."));
    }
    Ok(team)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinTeam {
    pub slug: String,
    pub email: String,
}

impl JoinTeam {
    /// The team, if `email` may join it.
    fn joinable(&self, session: &Session<'_>, reply: &mut Reply) -> Result<Option<Team>, ControlError> {
        let Some(team) = find_team(session, &self.slug, reply)? else {
            return Ok(None);
        };

        if !team.public {
            reply.error(format_args!(
                "The given team is not public. Please contact {} if you wish to join",
                team.owner_email
            ));
            return Ok(None);
        }

        if team.is_member(&self.email) {
            reply.warn("You are already a member of the team.");
            return Ok(None);
        }

        Ok(Some(team))
    }
}

impl fmt::Display for JoinTeam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "join-team {} {}", self.slug, self.email)
    }
}

impl Confirmable for JoinTeam {
    fn user_email(&self) -> &str {
        &self.email
    }

    fn pre_confirm(&mut self, session: &Session<'_>, reply: &mut Reply) -> Result<bool, ControlError> {
        if self.joinable(session, reply)?.is_none() {
            return Ok(false);
        }

        reply.reply(format!("A confirmation mail has been sent to {}", self.email));
        Ok(true)
    }

    fn confirmation_message(&self) -> String {
        format!("Makes you a member of the team {}.", self.slug)
    }

    fn handle(&mut self, session: &Session<'_>, reply: &mut Reply) -> Result<(), ControlError> {
        let Some(team) = self.joinable(session, reply)? else {
            return Ok(());
        };

        session.store().add_team_member(&team.slug, &self.email)?;
        reply.reply(format!("You have successfully joined the team \"{team}\""));

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaveTeam {
    pub slug: String,
    pub email: String,
}

impl LeaveTeam {
    /// The team, if `email` is one of its members.
    fn leavable(&self, session: &Session<'_>, reply: &mut Reply) -> Result<Option<Team>, ControlError> {
        let Some(team) = find_team(session, &self.slug, reply)? else {
            return Ok(None);
        };

        if !team.is_member(&self.email) {
            reply.warn("You are not a member of the team.");
            return Ok(None);
        }

        Ok(Some(team))
    }
}

impl fmt::Display for LeaveTeam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "leave-team {} {}", self.slug, self.email)
    }
}

impl Confirmable for LeaveTeam {
    fn user_email(&self) -> &str {
        &self.email
    }

    fn pre_confirm(&mut self, session: &Session<'_>, reply: &mut Reply) -> Result<bool, ControlError> {
        if self.leavable(session, reply)?.is_none() {
            return Ok(false);
        }

        reply.reply(format!("A confirmation mail has been sent to {}", self.email));
        Ok(true)
    }

    fn confirmation_message(&self) -> String {
        format!("Removes you from the team {}.", self.slug)
    }

    fn handle(&mut self, session: &Session<'_>, reply: &mut Reply) -> Result<(), ControlError> {
        let Some(team) = self.leavable(session, reply)? else {
            return Ok(());
        };

        session.store().remove_team_member(&team.slug, &self.email)?;
        reply.reply(format!(
            "You have successfully left the team \"{team}\" (slug: {})",
            team.slug
        ));

        Ok(())
    }
}

/// Packages of a team; private teams only show them to members.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListTeamPackages {
    pub slug: String,
    /// Sender of the control message, if known.
    pub requester: Option<String>,
}

impl fmt::Display for ListTeamPackages {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "list-team-packages {}", self.slug)
    }
}

impl Command for ListTeamPackages {
    fn execute(&mut self, session: &mut Session<'_>, reply: &mut Reply) -> Result<(), ControlError> {
        let Some(team) = find_team(session, &self.slug, reply)? else {
            return Ok(());
        };

        let allowed = team.public
            || self
                .requester
                .as_deref()
                .is_some_and(|email| team.is_member(email));
        if !allowed {
            reply.error("The team is private. Only team members can see its packages.");
            return Ok(());
        }

        reply.reply(format!("Packages found in team {team}:"));
        reply.list(&team.packages);

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WhichTeams {
    pub email: String,
}

impl fmt::Display for WhichTeams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "which-teams {}", self.email)
    }
}

impl Command for WhichTeams {
    fn execute(&mut self, session: &mut Session<'_>, reply: &mut Reply) -> Result<(), ControlError> {
        let teams = session.store().teams_of(&self.email)?;

        if teams.is_empty() {
            reply.warn(format_args!("{} is not a member of any team.", self.email));
        } else {
            reply.reply(format!("Teams that {} is a member of:", self.email));
            reply.list(teams.iter().map(|team| &team.slug));
        }

        Ok(())
    }
}
